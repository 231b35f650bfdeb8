//! The proxy as host of the offline engine.
//!
//! Clients are browser tabs identified by the `x-lampstand-client` header.
//! Navigation requests from the engine are published as events that pages
//! receive over server-sent events.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lampstand_client::WorkerHost;
use lampstand_core::Error;
use tokio::sync::broadcast;

pub const CLIENT_HEADER: &str = "x-lampstand-client";
pub const ANONYMOUS_CLIENT: &str = "anonymous";

const EVENT_CAPACITY: usize = 64;

/// Events pushed to connected pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Load `path` as a new document.
    Navigate(String),
}

pub struct ProxyHost {
    clients: Mutex<HashSet<String>>,
    claimed: Mutex<HashSet<String>>,
    registered: AtomicBool,
    events: broadcast::Sender<HostEvent>,
}

impl Default for ProxyHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyHost {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            clients: Mutex::new(HashSet::new()),
            claimed: Mutex::new(HashSet::new()),
            registered: AtomicBool::new(true),
            events,
        }
    }

    /// Record a client seen on an incoming request.
    pub fn touch(&self, client: &str) {
        if let Ok(mut clients) = self.clients.lock()
            && !clients.contains(client)
        {
            tracing::debug!(client, "new client");
            clients.insert(client.to_string());
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_controlled(&self, client: &str) -> bool {
        self.claimed.lock().map(|c| c.contains(client)).unwrap_or(false)
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl WorkerHost for ProxyHost {
    fn supports_navigation_preload(&self) -> bool {
        true
    }

    async fn claim_clients(&self) -> Result<usize, Error> {
        let clients = self
            .clients
            .lock()
            .map_err(|_| Error::InvalidState("client registry poisoned".into()))?
            .clone();
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| Error::InvalidState("client registry poisoned".into()))?;
        claimed.extend(clients);
        Ok(claimed.len())
    }

    async fn navigate_clients(&self, path: &str) -> Result<usize, Error> {
        // No subscriber means no page is listening; that is not a failure.
        let listeners = self.events.send(HostEvent::Navigate(path.to_string())).unwrap_or(0);
        tracing::info!(path, listeners, "navigating clients");
        Ok(listeners)
    }

    async fn unregister(&self) -> Result<bool, Error> {
        if let Ok(mut claimed) = self.claimed.lock() {
            claimed.clear();
        }
        Ok(self.registered.swap(false, Ordering::SeqCst))
    }
}
