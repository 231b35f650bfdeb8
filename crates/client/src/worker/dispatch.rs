//! Fetch strategy dispatch.
//!
//! | Class         | Strategy                               |
//! |---------------|----------------------------------------|
//! | navigation    | network first, shell fallback          |
//! | bible-content | stale while revalidate                 |
//! | static-asset  | cache first, background refresh        |
//! | other         | network first, cache then shell        |
//!
//! Background network updates are spawned and detached. Nobody joins them
//! once a cached response has been returned, so their failures are never
//! observed, and an update still running when the process exits is lost.

use lampstand_core::MatchOptions;
use tokio::task::JoinHandle;

use super::OfflineWorker;
use super::classify::ResourceClass;
use crate::fetch::{CacheMode, FetchRequest, FetchResponse};

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirstShellFallback,
    StaleWhileRevalidate,
    CacheFirstBackgroundRefresh,
    NetworkFirstCacheFallback,
}

impl From<ResourceClass> for Strategy {
    fn from(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Navigation => Strategy::NetworkFirstShellFallback,
            ResourceClass::BibleContent => Strategy::StaleWhileRevalidate,
            ResourceClass::StaticAsset => Strategy::CacheFirstBackgroundRefresh,
            ResourceClass::Other => Strategy::NetworkFirstCacheFallback,
        }
    }
}

/// An intercepted request plus anything the host prepared for it.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub request: FetchRequest,
    /// Response of the host's navigation preload, if it issued one.
    pub preload: Option<FetchResponse>,
}

impl FetchEvent {
    pub fn new(request: FetchRequest) -> Self {
        Self { request, preload: None }
    }

    pub fn with_preload(mut self, preload: Option<FetchResponse>) -> Self {
        self.preload = preload;
        self
    }
}

impl OfflineWorker {
    /// Serve an intercepted request.
    ///
    /// Returns None when the request is not intercepted: non-GET requests,
    /// and every request while the worker is not active. The host sends
    /// those straight to the network.
    pub async fn handle_fetch(&self, event: FetchEvent) -> Option<FetchResponse> {
        if !event.request.is_get() {
            return None;
        }
        if !self.context().state().can_intercept_fetch() {
            return None;
        }

        let key = self.normalizer().normalize(&event.request.url);
        let path = self.normalizer().path_of(&event.request.url);
        let class = self.classifier().classify(&event.request, &path);
        let strategy = Strategy::from(class);

        tracing::debug!(key = %key, class = %class, ?strategy, "dispatching fetch");

        let response = match strategy {
            Strategy::NetworkFirstShellFallback => self.network_first_shell_fallback(event).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(event, key).await,
            Strategy::CacheFirstBackgroundRefresh => self.cache_first_background_refresh(event, key).await,
            Strategy::NetworkFirstCacheFallback => self.network_first_cache_fallback(event, key).await,
        };

        Some(response)
    }

    async fn network_first_shell_fallback(&self, event: FetchEvent) -> FetchResponse {
        if self.context().navigation_preload_enabled()
            && let Some(preloaded) = event.preload
        {
            return preloaded;
        }

        match self.network().fetch(&event.request, CacheMode::Reload).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("navigation to {} failed, serving shell: {e}", event.request.url);
                self.shell_fallback().await.unwrap_or_else(FetchResponse::offline_text)
            }
        }
    }

    async fn stale_while_revalidate(&self, event: FetchEvent, key: String) -> FetchResponse {
        let update = self.spawn_network_update(event.request, key.clone());

        if let Some(cached) = self.lookup(&key, MatchOptions::default()).await {
            return cached;
        }

        match update.await {
            Ok(Some(response)) => response,
            _ => FetchResponse::offline_json(),
        }
    }

    async fn cache_first_background_refresh(&self, event: FetchEvent, key: String) -> FetchResponse {
        let refresh = self.spawn_network_update(event.request, key.clone());

        if let Some(cached) = self.lookup(&key, MatchOptions::default()).await {
            return cached;
        }

        match refresh.await {
            Ok(Some(response)) => response,
            _ => FetchResponse::offline_text(),
        }
    }

    async fn network_first_cache_fallback(&self, event: FetchEvent, key: String) -> FetchResponse {
        match self.network().fetch(&event.request, CacheMode::Reload).await {
            Ok(response) => {
                self.store_response(&key, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!("fetch of {key} failed, trying cache: {e}");
                if let Some(cached) = self.lookup(&key, MatchOptions::default()).await {
                    return cached;
                }
                // Path-only keys are first-party.
                if key.starts_with('/')
                    && let Some(shell) = self.lookup(&self.config().shell_document, MatchOptions::ignore_search()).await
                {
                    return shell;
                }
                FetchResponse::offline_text()
            }
        }
    }

    /// Stored shell document: the root path first, then the shell document.
    async fn shell_fallback(&self) -> Option<FetchResponse> {
        if let Some(root) = self.lookup("/", MatchOptions::ignore_search()).await {
            return Some(root);
        }
        self.lookup(&self.config().shell_document, MatchOptions::ignore_search()).await
    }

    /// Fetch bypassing HTTP caches and store the result if eligible.
    ///
    /// Resolves to None when the network is unreachable.
    fn spawn_network_update(&self, request: FetchRequest, key: String) -> JoinHandle<Option<FetchResponse>> {
        let worker = self.clone();
        tokio::spawn(async move {
            match worker.network().fetch(&request, CacheMode::Reload).await {
                Ok(response) => {
                    worker.store_response(&key, &response).await;
                    Some(response)
                }
                Err(e) => {
                    tracing::debug!("background update of {key} failed: {e}");
                    None
                }
            }
        })
    }

    /// Cache lookup where store failures read as misses.
    pub(crate) async fn lookup(&self, key: &str, options: MatchOptions) -> Option<FetchResponse> {
        match self.store().get(key, options).await {
            Ok(entry) => entry.map(FetchResponse::from_cached),
            Err(e) => {
                tracing::warn!("cache lookup for {key} failed: {e}");
                None
            }
        }
    }

    /// Store ok and opaque responses; everything else is left out.
    pub(crate) async fn store_response(&self, key: &str, response: &FetchResponse) -> bool {
        // A refresh finishing after CLEAR_ALL writes nothing.
        if self.state().is_terminal() {
            return false;
        }
        if !response.is_cacheable() {
            tracing::debug!("not caching {key}: status {}", response.status.as_u16());
            return false;
        }
        match self.store().put(&response.to_cached(key)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to cache {key}: {e}");
                false
            }
        }
    }
}
