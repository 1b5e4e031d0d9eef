//! Repositories over the netstage schema
//!
//! Each repository borrows a connection handed in by the caller. Passing a
//! `Transaction` (which derefs to `Connection`) makes a repository's writes
//! part of the caller's transaction.

#![allow(clippy::result_large_err)]

pub mod ledger;
pub mod resources;
pub mod snapshots;

pub use ledger::ChangeLedger;
pub use resources::ResourceRepo;
pub use snapshots::SnapshotRepo;

use crate::errors::{from_rusqlite, serialization, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(op: &str, ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| serialization(op, format!("timestamp {} out of range", ms)))
}

/// Run `f` inside a transaction unless one is already open on `conn`
pub(crate) fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = conn.unchecked_transaction().map_err(from_rusqlite)?;
    let value = f(&tx)?;
    tx.commit().map_err(from_rusqlite)?;
    Ok(value)
}
