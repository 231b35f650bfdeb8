//! The offline engine.
//!
//! ### Lifecycle
//! - `parsed -> installing -> waiting -> activating -> active`
//! - Install failure, or a CLEAR_ALL message, ends in `redundant`
//! - A version already installed by an earlier process resumes at `waiting`
//!
//! ### Precache
//! - Shell paths are stored atomically; one failure fails the install
//! - Build assets found in the shell document are best effort
//! - The content corpus is fetched in sequential batches, best effort
//!
//! ### Fetch
//! - Only GET requests are intercepted, and only while active
//! - Each request is classified once and served by that class's strategy

mod classify;
mod context;
mod dispatch;
mod host;
mod lifecycle;
mod precache;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use lampstand_core::{AppConfig, CacheDb, CacheStore, Error};
use reqwest::Url;
use serde::{Deserialize, Serialize};

pub use classify::{Classifier, ResourceClass};
pub use context::{LifecycleState, WorkerContext};
pub use dispatch::{FetchEvent, Strategy};
pub use host::WorkerHost;
pub use lifecycle::ActivateReport;
pub use precache::PrecacheReport;

use crate::fetch::{Network, UrlNormalizer};

/// Settings of the offline engine, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name of this version's cache store.
    pub cache_name: String,
    pub origin: Url,
    pub first_party_hosts: Vec<String>,
    pub shell_paths: Vec<String>,
    pub shell_document: String,
    pub content_prefix: String,
    pub content_extensions: Vec<String>,
    pub asset_prefixes: Vec<String>,
    pub asset_extensions: Vec<String>,
    pub content_index_path: String,
    pub precache_corpus: bool,
    pub precache_batch_size: usize,
    pub navigation_preload: bool,
}

impl WorkerConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;

        Ok(Self {
            cache_name: config.cache_name(),
            origin,
            first_party_hosts: config.first_party_hosts.clone(),
            shell_paths: config.shell_paths.clone(),
            shell_document: config.shell_document.clone(),
            content_prefix: config.content_prefix.clone(),
            content_extensions: config.content_extensions.clone(),
            asset_prefixes: config.asset_prefixes.clone(),
            asset_extensions: config.asset_extensions.clone(),
            content_index_path: config.content_index_path.clone(),
            precache_corpus: config.precache_corpus,
            precache_batch_size: config.precache_batch_size.max(1),
            navigation_preload: config.navigation_preload,
        })
    }
}

/// Control messages posted by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate a waiting version now.
    SkipWaiting,
    /// Delete every store, unregister, and send clients to the root.
    ClearAll,
}

/// Snapshot of the engine for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: LifecycleState,
    pub cache_name: String,
    /// Every store currently present, oldest first.
    pub caches: Vec<String>,
    /// Entries in this version's store.
    pub entries: u64,
    pub navigation_preload: bool,
    pub last_precache: Option<PrecacheReport>,
}

/// Handle to the offline engine. Cheap to clone.
#[derive(Clone)]
pub struct OfflineWorker {
    inner: Arc<Inner>,
}

struct Inner {
    config: WorkerConfig,
    db: CacheDb,
    store: CacheStore,
    network: Arc<dyn Network>,
    host: Arc<dyn WorkerHost>,
    normalizer: UrlNormalizer,
    classifier: Classifier,
    context: WorkerContext,
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, db: CacheDb, network: Arc<dyn Network>, host: Arc<dyn WorkerHost>) -> Self {
        let normalizer = UrlNormalizer::new(config.origin.clone(), &config.first_party_hosts);
        let classifier = Classifier::new(&config);
        let store = db.store(&config.cache_name);

        Self {
            inner: Arc::new(Inner {
                config,
                db,
                store,
                network,
                host,
                normalizer,
                classifier,
                context: WorkerContext::new(),
            }),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &WorkerContext {
        &self.inner.context
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.context.state()
    }

    pub fn normalizer(&self) -> &UrlNormalizer {
        &self.inner.normalizer
    }

    pub fn classifier(&self) -> &Classifier {
        &self.inner.classifier
    }

    /// This version's cache store.
    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    pub(crate) fn db(&self) -> &CacheDb {
        &self.inner.db
    }

    pub(crate) fn network(&self) -> &dyn Network {
        self.inner.network.as_ref()
    }

    pub(crate) fn host(&self) -> &dyn WorkerHost {
        self.inner.host.as_ref()
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        Ok(WorkerStatus {
            state: self.state(),
            cache_name: self.inner.config.cache_name.clone(),
            caches: self.inner.db.store_names().await?,
            entries: self.inner.store.len().await?,
            navigation_preload: self.inner.context.navigation_preload_enabled(),
            last_precache: self.inner.context.last_precache(),
        })
    }
}
