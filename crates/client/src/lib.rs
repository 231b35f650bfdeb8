//! Offline engine for lampstand.
//!
//! This crate provides the network seam, shell and content-index discovery,
//! and the worker that precaches a deployment and serves it through
//! per-class cache strategies.

pub mod discover;
pub mod fetch;
pub mod worker;

pub use fetch::{CacheMode, FetchConfig, FetchRequest, FetchResponse, HttpNetwork, Network, UrlNormalizer};
pub use worker::{
    ControlMessage, FetchEvent, LifecycleState, OfflineWorker, PrecacheReport, ResourceClass, WorkerConfig,
    WorkerHost, WorkerStatus,
};
