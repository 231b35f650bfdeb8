//! Lifecycle events: install, activate, and control messages.

use lampstand_core::Error;
use serde::Serialize;

use super::{ControlMessage, LifecycleState, OfflineWorker, PrecacheReport};

/// Outcome of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    /// Stores of other versions that were deleted.
    pub evicted: Vec<String>,
    pub navigation_preload: bool,
    pub clients_claimed: usize,
}

impl OfflineWorker {
    /// Bring the engine up.
    ///
    /// A version installed by an earlier process resumes straight to
    /// activation. Otherwise the version is installed first, then activated
    /// once skip-waiting has been requested.
    pub async fn start(&self) -> Result<LifecycleState, Error> {
        let name = self.store().name().to_string();
        let installed = self.db().is_installed(&name).await.unwrap_or_else(|e| {
            tracing::warn!("could not read install marker of {name}: {e}");
            false
        });

        if installed {
            tracing::info!(cache = %name, "resuming installed version");
            self.context().transition(LifecycleState::Waiting)?;
            self.activate().await?;
        } else {
            self.install().await?;
            if self.context().skip_waiting_requested() {
                self.activate().await?;
            }
        }
        Ok(self.state())
    }

    /// Precache this version. On failure the engine becomes redundant.
    pub async fn install(&self) -> Result<PrecacheReport, Error> {
        self.context().transition(LifecycleState::Installing)?;

        match self.run_install().await {
            Ok(report) => {
                self.context().record_precache(report.clone());
                self.context().transition(LifecycleState::Waiting)?;
                self.context().request_skip_waiting();
                Ok(report)
            }
            Err(e) => {
                tracing::error!("install of {} failed: {e}", self.store().name());
                if !self.state().is_terminal() {
                    self.context().transition(LifecycleState::Redundant)?;
                }
                Err(e)
            }
        }
    }

    async fn run_install(&self) -> Result<PrecacheReport, Error> {
        let name = self.store().name().to_string();
        self.db().open_store(&name).await?;
        if self.state().is_terminal() {
            self.db().delete_store(&name).await?;
            return Err(Error::InstallFailed(format!("{name} was cleared during install")));
        }

        let report = self.precache().await?;
        if self.state().is_terminal() {
            return Err(Error::InstallFailed(format!("{name} was cleared during install")));
        }

        if let Err(e) = self.db().mark_installed(&name).await {
            tracing::warn!("could not mark {name} installed: {e}");
        }
        Ok(report)
    }

    /// Evict other versions and take control of clients.
    ///
    /// Eviction and claim failures are logged and never block activation.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.context().transition(LifecycleState::Activating)?;

        let mut report = ActivateReport { evicted: self.evict_other_versions().await, ..Default::default() };

        if self.config().navigation_preload && self.host().supports_navigation_preload() {
            self.context().enable_navigation_preload();
            report.navigation_preload = true;
        }

        report.clients_claimed = match self.host().claim_clients().await {
            Ok(claimed) => claimed,
            Err(e) => {
                tracing::warn!("claiming clients failed: {e}");
                0
            }
        };

        self.context().transition(LifecycleState::Active)?;
        tracing::info!(
            cache = %self.store().name(),
            evicted = report.evicted.len(),
            clients = report.clients_claimed,
            navigation_preload = report.navigation_preload,
            "worker active"
        );
        Ok(report)
    }

    async fn evict_other_versions(&self) -> Vec<String> {
        let current = self.store().name();
        let names = match self.db().store_names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("listing stores failed: {e}");
                return Vec::new();
            }
        };

        let mut evicted = Vec::new();
        for name in names.into_iter().filter(|name| name != current) {
            match self.db().delete_store(&name).await {
                Ok(true) => evicted.push(name),
                Ok(false) => {}
                Err(e) => tracing::warn!("evicting {name} failed: {e}"),
            }
        }
        evicted
    }

    /// Handle a message posted by a page.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<LifecycleState, Error> {
        tracing::info!(?message, state = %self.state(), "control message");
        match message {
            ControlMessage::SkipWaiting => {
                self.context().request_skip_waiting();
                if self.state() == LifecycleState::Waiting {
                    self.activate().await?;
                }
            }
            ControlMessage::ClearAll => self.clear_all().await?,
        }
        Ok(self.state())
    }

    /// Redundant first, so no install or refresh still running can write
    /// into a store after it is deleted.
    async fn clear_all(&self) -> Result<(), Error> {
        if !self.state().is_terminal() {
            self.context().transition(LifecycleState::Redundant)?;
        }
        let deleted = self.db().delete_all_stores().await?;

        let unregistered = self.host().unregister().await.unwrap_or_else(|e| {
            tracing::warn!("unregister failed: {e}");
            false
        });
        let navigated = self.host().navigate_clients("/").await.unwrap_or_else(|e| {
            tracing::warn!("navigating clients failed: {e}");
            0
        });

        tracing::info!(deleted, unregistered, navigated, "cleared all caches");
        Ok(())
    }
}
