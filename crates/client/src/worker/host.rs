//! Capabilities the hosting process lends to the engine.

use async_trait::async_trait;
use lampstand_core::Error;

/// Host environment of the offline engine.
///
/// The engine never owns client contexts or its own registration; it asks
/// the host through this trait.
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Whether the host can issue navigation preload requests.
    fn supports_navigation_preload(&self) -> bool {
        false
    }

    /// Take control of every open client. Returns how many were claimed.
    async fn claim_clients(&self) -> Result<usize, Error>;

    /// Force every open client to navigate to `path`. Returns how many were told.
    async fn navigate_clients(&self, path: &str) -> Result<usize, Error>;

    /// Remove the engine's registration. Returns false if it was not registered.
    async fn unregister(&self) -> Result<bool, Error>;
}
