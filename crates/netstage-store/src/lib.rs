//! netstage store - SQLite persistence for staged network changes
//!
//! Provides:
//! - SQLite connection helpers and embedded, checksummed migrations
//! - The Change Ledger of staged changes
//! - The snapshot repository used by apply and rollback
//! - Persistent bridge and interface definitions replayed at boot

pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

pub use errors::Result;
pub use repo::{ChangeLedger, ResourceRepo, SnapshotRepo};
