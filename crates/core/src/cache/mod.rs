//! SQLite-backed versioned cache stores.
//!
//! This module provides the persistent request/response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Multiple named stores, one per deployed version
//! - Snapshots keyed by normalized request URL, with query-insensitive lookup
//! - SHA-256 body digests
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CachedResponse, MatchOptions, search_free_key};
pub use stores::CacheStore;
