//! Core types and shared functionality for lampstand.
//!
//! This crate provides:
//! - Versioned cache stores with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStore, CachedResponse, MatchOptions};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
