//! Worker-scoped state.
//!
//! Everything the engine remembers between events lives here: the lifecycle
//! state, the skip-waiting request, the navigation preload flag and the last
//! precache report. Fields change only through the methods below.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use lampstand_core::Error;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::precache::PrecacheReport;

/// Lifecycle states of the offline engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Created, no lifecycle event handled yet.
    Parsed,
    Installing,
    /// Installed, not yet controlling requests.
    Waiting,
    Activating,
    Active,
    /// Failed to install, or reset by CLEAR_ALL. Terminal.
    Redundant,
}

impl LifecycleState {
    /// Only an active worker intercepts fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Redundant)
    }

    /// Allowed edges of the lifecycle graph.
    ///
    /// `Parsed -> Waiting` resumes a version installed by an earlier process.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (*self, next) {
            (Redundant, _) => false,
            (_, Redundant) => true,
            (Parsed, Installing) | (Parsed, Waiting) => true,
            (Installing, Waiting) | (Waiting, Activating) | (Activating, Active) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Explicit worker context, created once at startup and never reset.
#[derive(Debug)]
pub struct WorkerContext {
    state: watch::Sender<LifecycleState>,
    skip_waiting: AtomicBool,
    navigation_preload: AtomicBool,
    last_precache: watch::Sender<Option<PrecacheReport>>,
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerContext {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Parsed);
        let (last_precache, _) = watch::channel(None);
        Self { state, skip_waiting: AtomicBool::new(false), navigation_preload: AtomicBool::new(false), last_precache }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Move to `next`, rejecting edges the lifecycle does not allow.
    pub fn transition(&self, next: LifecycleState) -> Result<(), Error> {
        let mut previous = next;
        let changed = self.state.send_if_modified(|current| {
            previous = *current;
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if changed {
            tracing::info!(from = %previous, to = %next, "worker state changed");
            Ok(())
        } else {
            Err(Error::InvalidState(format!("cannot move from {previous} to {next}")))
        }
    }

    /// Ask for activation without waiting for controlled clients to go away.
    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    pub fn enable_navigation_preload(&self) {
        self.navigation_preload.store(true, Ordering::SeqCst);
    }

    pub fn navigation_preload_enabled(&self) -> bool {
        self.navigation_preload.load(Ordering::SeqCst)
    }

    pub fn record_precache(&self, report: PrecacheReport) {
        self.last_precache.send_replace(Some(report));
    }

    pub fn last_precache(&self) -> Option<PrecacheReport> {
        self.last_precache.borrow().clone()
    }
}
