//! Recovery of interrupted apply transactions
//!
//! A snapshot still `active` when no apply is running means the process
//! died mid-transaction. Its host changes may be partly applied, so the
//! snapshot is rolled back and its pending changes discarded.

#![allow(clippy::result_large_err)]

use crate::commands::EngineContext;
use crate::rollback::{RollbackEngine, RollbackReport};
use netstage_core::errors::ExError;
use netstage_core::model::SnapshotStatus;
use netstage_core::{log_op_end, log_op_start};
use netstage_store::errors::Result;
use netstage_store::SnapshotRepo;
use rusqlite::Connection;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub rolled_back: Vec<RollbackReport>,
    /// `(snapshot_id, error)` for snapshots left active
    pub failed: Vec<(String, ExError)>,
}

/// Roll back every interrupted transaction, oldest first
///
/// # Errors
///
/// Returns `Persistence` when active snapshots cannot be listed. Individual
/// rollback failures are reported in [`RecoveryReport::failed`].
pub fn recover_interrupted(conn: &Connection, engine: &EngineContext<'_>) -> Result<RecoveryReport> {
    let start = Instant::now();
    log_op_start!("recover_interrupted");

    let mut active = SnapshotRepo::new(conn).list_by_status(SnapshotStatus::Active)?;
    active.sort_by_key(|s| s.created_at);
    if !active.is_empty() {
        tracing::warn!(count = active.len(), "found interrupted apply transactions");
    }

    let rollback = RollbackEngine::new(engine.runner, &engine.files);
    let mut report = RecoveryReport::default();
    for snapshot in active {
        match rollback.rollback(conn, &snapshot.id) {
            Ok(done) => report.rolled_back.push(done),
            Err(e) => report.failed.push((snapshot.id, e)),
        }
    }

    log_op_end!(
        "recover_interrupted",
        duration_ms = start.elapsed().as_millis() as u64,
        rolled_back = report.rolled_back.len(),
        failed = report.failed.len()
    );
    Ok(report)
}
