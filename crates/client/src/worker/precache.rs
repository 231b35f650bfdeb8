//! Install-time precaching.

use std::collections::HashSet;

use futures_util::future::{join_all, try_join_all};
use lampstand_core::Error;
use serde::{Deserialize, Serialize};

use super::OfflineWorker;
use crate::discover::{discover_assets, parse_content_index};
use crate::fetch::{CacheMode, FetchRequest, RequestMode};

/// What one install stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheReport {
    /// Shell entries, all stored in one transaction.
    pub shell: usize,
    pub assets_stored: usize,
    pub assets_failed: usize,
    pub corpus_stored: usize,
    pub corpus_failed: usize,
    /// Sequential batches the corpus was fetched in.
    pub corpus_batches: usize,
}

impl OfflineWorker {
    /// Fill this version's store.
    ///
    /// Only the shell step can fail the install. Asset and corpus failures
    /// are counted in the report and otherwise ignored.
    pub async fn precache(&self) -> Result<PrecacheReport, Error> {
        let mut report = PrecacheReport { shell: self.precache_shell().await?, ..Default::default() };

        let (stored, failed) = self.precache_shell_assets().await;
        report.assets_stored = stored;
        report.assets_failed = failed;

        if self.config().precache_corpus {
            self.precache_corpus(&mut report).await;
        }

        tracing::info!(
            cache = %self.store().name(),
            shell = report.shell,
            assets_stored = report.assets_stored,
            assets_failed = report.assets_failed,
            corpus_stored = report.corpus_stored,
            corpus_failed = report.corpus_failed,
            "precache complete"
        );
        Ok(report)
    }

    /// All shell paths, or nothing.
    async fn precache_shell(&self) -> Result<usize, Error> {
        let fetches = self.config().shell_paths.iter().map(|path| async move {
            let request = FetchRequest::get(path.as_str());
            let response = self
                .network()
                .fetch(&request, CacheMode::Reload)
                .await
                .map_err(|e| Error::InstallFailed(format!("{path}: {e}")))?;
            if !response.is_ok() {
                return Err(Error::InstallFailed(format!("{path}: status {}", response.status.as_u16())));
            }
            Ok::<_, Error>(response.to_cached(&self.normalizer().normalize(path)))
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        self.store()
            .put_all(entries)
            .await
            .map_err(|e| Error::InstallFailed(format!("storing shell: {e}")))?;
        Ok(count)
    }

    /// Fresh shell document plus the build assets it references.
    async fn precache_shell_assets(&self) -> (usize, usize) {
        let document = self.config().shell_document.clone();
        let request = FetchRequest::get(document.as_str());
        let response = match self.network().fetch(&request, CacheMode::Reload).await {
            Ok(response) if response.is_ok() => response,
            Ok(response) => {
                tracing::warn!("shell document {document} returned {}, skipping assets", response.status.as_u16());
                return (0, 0);
            }
            Err(e) => {
                tracing::warn!("shell document {document} unavailable, skipping assets: {e}");
                return (0, 0);
            }
        };
        self.store_response(&self.normalizer().normalize(&document), &response).await;

        let base = match self.normalizer().resolve(&document) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!("cannot resolve {document}: {e}");
                return (0, 0);
            }
        };
        let html = String::from_utf8_lossy(&response.bytes);
        let assets = discover_assets(&html, &base);
        tracing::debug!("discovered {} assets in {document}", assets.len());

        let results = join_all(assets.iter().map(|url| self.precache_one(url.as_str()))).await;
        tally(&results)
    }

    async fn precache_corpus(&self, report: &mut PrecacheReport) {
        let index_path = self.config().content_index_path.clone();
        let request = FetchRequest::get(index_path.as_str());
        let bytes = match self.network().fetch(&request, CacheMode::Reload).await {
            Ok(response) if response.is_ok() => response.bytes,
            Ok(response) => {
                tracing::warn!("content index {index_path} returned {}", response.status.as_u16());
                return;
            }
            Err(e) => {
                tracing::warn!("content index {index_path} unavailable: {e}");
                return;
            }
        };

        let entries = match parse_content_index(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("skipping corpus precache: {e}");
                return;
            }
        };

        let mut seen = HashSet::new();
        let urls: Vec<String> = entries
            .iter()
            .map(|entry| self.normalizer().normalize(entry))
            .filter(|key| seen.insert(key.clone()))
            .collect();

        let batch_size = self.config().precache_batch_size.max(1);
        for batch in urls.chunks(batch_size) {
            let results = join_all(batch.iter().map(|url| self.precache_one(url))).await;
            let (stored, failed) = tally(&results);
            report.corpus_stored += stored;
            report.corpus_failed += failed;
            report.corpus_batches += 1;
        }
    }

    /// Fetch and store one URL. False on any failure.
    ///
    /// First-party URLs are fetched by their path so they reach the
    /// configured origin as-is; other keys are cross-origin requests.
    async fn precache_one(&self, url: &str) -> bool {
        let key = self.normalizer().normalize(url);
        let mut request = FetchRequest::get(key.as_str());
        if !key.starts_with('/') {
            request = request.with_mode(RequestMode::Cors);
        }
        match self.network().fetch(&request, CacheMode::Reload).await {
            Ok(response) => self.store_response(&key, &response).await,
            Err(e) => {
                tracing::debug!("precache of {key} failed: {e}");
                false
            }
        }
    }
}

fn tally(results: &[bool]) -> (usize, usize) {
    let stored = results.iter().filter(|ok| **ok).count();
    (stored, results.len() - stored)
}
