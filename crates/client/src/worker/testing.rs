//! Stub network and host for worker tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lampstand_core::{CacheDb, Error};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};

use super::{OfflineWorker, WorkerConfig, WorkerHost};
use crate::fetch::{CacheMode, FetchRequest, FetchResponse, Network, RequestMode, ResponseKind, UrlNormalizer};

pub(crate) const SHELL_HTML: &str = r#"<!doctype html>
<html>
  <head>
    <script type="module" src="/assets/index-4f2a.js"></script>
    <link rel="stylesheet" href="/assets/index-9c1d.css">
  </head>
  <body><div id="root"></div></body>
</html>"#;

pub(crate) fn test_config() -> WorkerConfig {
    WorkerConfig {
        cache_name: "lampstand-test".to_string(),
        origin: Url::parse("https://bible.example.org").unwrap(),
        first_party_hosts: Vec::new(),
        shell_paths: vec!["/".to_string(), "/index.html".to_string()],
        shell_document: "/index.html".to_string(),
        content_prefix: "/bible/".to_string(),
        content_extensions: vec!["json".to_string()],
        asset_prefixes: vec!["/assets/".to_string()],
        asset_extensions: ["js", "css", "woff2", "png", "ico"].map(String::from).to_vec(),
        content_index_path: "/bible/index.json".to_string(),
        precache_corpus: false,
        precache_batch_size: 10,
        navigation_preload: true,
    }
}

#[derive(Clone)]
struct Route {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
}

/// Scriptable network keyed by normalized URL. Unknown URLs return 404.
pub(crate) struct StubNetwork {
    normalizer: UrlNormalizer,
    routes: Mutex<HashMap<String, Route>>,
    held: Mutex<HashSet<String>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<(String, CacheMode)>>,
}

impl StubNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            normalizer: UrlNormalizer::new(test_config().origin, &[]),
            routes: Mutex::new(HashMap::new()),
            held: Mutex::new(HashSet::new()),
            offline: AtomicBool::new(false),
            delay: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn route(&self, url: &str, status: StatusCode, content_type: &'static str, body: &str) {
        let route = Route { status, content_type, body: Bytes::from(body.to_string()) };
        self.routes.lock().unwrap().insert(self.normalizer.normalize(url), route);
    }

    pub(crate) fn ok_json(&self, url: &str, body: &str) {
        self.route(url, StatusCode::OK, "application/json", body);
    }

    /// Fetches of `url` never complete.
    pub(crate) fn hold(&self, url: &str) {
        self.held.lock().unwrap().insert(self.normalizer.normalize(url));
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_max_in_flight(&self) {
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    /// Every fetch seen, as (normalized URL, cache mode).
    pub(crate) fn requests(&self) -> Vec<(String, CacheMode)> {
        self.log.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &FetchRequest, cache: CacheMode) -> Result<FetchResponse, Error> {
        let key = self.normalizer.normalize(&request.url);
        self.log.lock().unwrap().push((key.clone(), cache));

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {key}")));
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let held = self.held.lock().unwrap().contains(&key);
        if held {
            std::future::pending::<()>().await;
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let route = self.routes.lock().unwrap().get(&key).cloned().unwrap_or(Route {
            status: StatusCode::NOT_FOUND,
            content_type: "text/plain",
            body: Bytes::from_static(b"Not Found"),
        });

        let resolved = self.normalizer.resolve(&request.url).unwrap();
        let kind = if self.normalizer.is_first_party(&resolved) {
            ResponseKind::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseKind::Opaque
        } else {
            ResponseKind::Cors
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(route.content_type));
        Ok(FetchResponse {
            url: resolved.to_string(),
            status: route.status,
            headers,
            bytes: route.body,
            kind,
            fetch_ms: 0,
        })
    }
}

/// Host that records what the engine asked of it.
pub(crate) struct StubHost {
    pub(crate) preload: bool,
    pub(crate) fail_unregister: bool,
    pub(crate) registered: AtomicBool,
    pub(crate) claimed: AtomicUsize,
    pub(crate) navigated: Mutex<Vec<String>>,
}

impl Default for StubHost {
    fn default() -> Self {
        Self {
            preload: true,
            fail_unregister: false,
            registered: AtomicBool::new(true),
            claimed: AtomicUsize::new(0),
            navigated: Mutex::new(Vec::new()),
        }
    }
}

impl StubHost {
    pub(crate) fn claims(&self) -> usize {
        self.claimed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.navigated.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerHost for StubHost {
    fn supports_navigation_preload(&self) -> bool {
        self.preload
    }

    async fn claim_clients(&self) -> Result<usize, Error> {
        self.claimed.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn navigate_clients(&self, path: &str) -> Result<usize, Error> {
        self.navigated.lock().unwrap().push(path.to_string());
        Ok(1)
    }

    async fn unregister(&self) -> Result<bool, Error> {
        if self.fail_unregister {
            return Err(Error::InvalidState("registration is gone".into()));
        }
        Ok(self.registered.swap(false, Ordering::SeqCst))
    }
}

/// Network serving the shell paths and the two assets the shell references.
pub(crate) fn shell_network() -> Arc<StubNetwork> {
    let network = StubNetwork::new();
    network.route("/", StatusCode::OK, "text/html", SHELL_HTML);
    network.route("/index.html", StatusCode::OK, "text/html", SHELL_HTML);
    network.route("/assets/index-4f2a.js", StatusCode::OK, "text/javascript", "import './app.js'");
    network.route("/assets/index-9c1d.css", StatusCode::OK, "text/css", "body{margin:0}");
    network
}

pub(crate) fn worker_with_db(
    config: WorkerConfig, db: CacheDb, network: Arc<StubNetwork>, host: Arc<StubHost>,
) -> OfflineWorker {
    OfflineWorker::new(config, db, network, host)
}

/// Fresh worker over an in-memory store, still `parsed`.
pub(crate) async fn worker_with(config: WorkerConfig, network: Arc<StubNetwork>) -> (OfflineWorker, Arc<StubHost>) {
    let db = CacheDb::open_in_memory().await.unwrap();
    let host = Arc::new(StubHost::default());
    (worker_with_db(config, db, network, host.clone()), host)
}

/// Fresh worker whose store is open, as during install.
pub(crate) async fn precaching_worker(config: WorkerConfig, network: Arc<StubNetwork>) -> OfflineWorker {
    let (worker, _) = worker_with(config, network).await;
    worker.db().open_store(worker.store().name()).await.unwrap();
    worker
}

/// Worker that installed against [`shell_network`] and is active.
pub(crate) async fn active_worker(config: WorkerConfig) -> (OfflineWorker, Arc<StubNetwork>, Arc<StubHost>) {
    let network = shell_network();
    let (worker, host) = worker_with(config, network.clone()).await;
    worker.start().await.unwrap();
    assert!(worker.state().can_intercept_fetch());
    (worker, network, host)
}
