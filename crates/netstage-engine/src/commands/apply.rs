//! Apply Orchestrator
//!
//! ## Transaction (in order):
//! 1. Checking: refuse when nothing is pending (no snapshot, no host access)
//! 2. Snapshotting: persist an `active` snapshot before any mutation
//! 3. Applying: run each change's applier in ledger order
//! 4. Reloading: escalate through the networking reload strategies
//! 5. Committing: ledger marks, resource definitions and the snapshot
//!    status are written in one SQL transaction, then file backups are
//!    removed
//!
//! Any failure after step 2 hands the snapshot to the Rollback Engine.

#![allow(clippy::result_large_err)]

use crate::capture::SnapshotCapturer;
use crate::commands::EngineContext;
use crate::reload::{reload_networking, ReloadStrategy};
use crate::rollback::{remove_backups, RollbackEngine};
use netstage_core::appliers::ApplyContext;
use netstage_core::core_types::TraceId;
use netstage_core::errors::{ExError, ExErrorKind};
use netstage_core::model::{
    ChangeAction, ChangeConfig, NetworkSnapshot, PendingChange, PersistentBridge,
    PersistentInterface,
};
use netstage_core::{log_op_end, log_op_error, log_op_start, log_phase};
use netstage_store::errors::{from_rusqlite, Result};
use netstage_store::{ChangeLedger, ResourceRepo, SnapshotRepo};
use rusqlite::Connection;
use serde::Serialize;
use std::time::Instant;

const OP: &str = "apply_pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Idle,
    Checking,
    Snapshotting,
    Applying,
    Reloading,
    Committed,
    RollingBack,
    RolledBack,
}

impl ApplyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyPhase::Idle => "idle",
            ApplyPhase::Checking => "checking",
            ApplyPhase::Snapshotting => "snapshotting",
            ApplyPhase::Applying => "applying",
            ApplyPhase::Reloading => "reloading",
            ApplyPhase::Committed => "committed",
            ApplyPhase::RollingBack => "rolling_back",
            ApplyPhase::RolledBack => "rolled_back",
        }
    }
}

/// Result of a committed apply transaction.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub trace_id: TraceId,
    pub snapshot_id: String,
    /// Change ids in the order they were applied
    pub applied: Vec<String>,
    pub reload: ReloadStrategy,
    pub duration_ms: u64,
}

/// Drives one apply transaction through its phases
pub struct ApplyOrchestrator<'a> {
    conn: &'a Connection,
    engine: &'a EngineContext<'a>,
    phase: ApplyPhase,
    trace_id: TraceId,
    started: Instant,
}

impl<'a> ApplyOrchestrator<'a> {
    pub fn new(conn: &'a Connection, engine: &'a EngineContext<'a>) -> Self {
        Self {
            conn,
            engine,
            phase: ApplyPhase::Idle,
            trace_id: TraceId::new(),
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> ApplyPhase {
        self.phase
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Apply every pending change as one transaction
    ///
    /// # Errors
    ///
    /// - `NothingToApply` when the ledger has no pending changes
    /// - `SnapshotFailed` when the baseline cannot be captured; nothing was touched
    /// - `ApplyFailed` / `ReloadFailed` after a successful rollback
    /// - `RollbackFailed` when rollback itself failed
    pub fn run(&mut self) -> Result<ApplyReport> {
        self.started = Instant::now();
        log_op_start!(OP, trace_id = %self.trace_id);

        let result = self.execute();
        let duration_ms = self.started.elapsed().as_millis() as u64;
        match &result {
            Ok(report) => {
                log_op_end!(
                    OP,
                    duration_ms = duration_ms,
                    trace_id = %self.trace_id,
                    snapshot_id = %report.snapshot_id,
                    applied = report.applied.len()
                );
            }
            Err(err) => {
                log_op_error!(
                    OP,
                    err.clone(),
                    duration_ms = duration_ms,
                    trace_id = %self.trace_id
                );
            }
        }
        result
    }

    fn enter(&mut self, phase: ApplyPhase) {
        self.phase = phase;
        log_phase!(OP, phase.as_str(), trace_id = %self.trace_id);
    }

    fn execute(&mut self) -> Result<ApplyReport> {
        let (conn, engine) = (self.conn, self.engine);

        self.enter(ApplyPhase::Checking);
        let pending = ChangeLedger::new(conn).list_pending()?;
        if pending.is_empty() {
            self.phase = ApplyPhase::Idle;
            return Err(ExError::new(ExErrorKind::NothingToApply)
                .with_op(OP)
                .with_trace_id(self.trace_id.clone())
                .with_message("no pending changes"));
        }

        self.enter(ApplyPhase::Snapshotting);
        let snapshot = SnapshotCapturer::new(engine.runner, &engine.files)
            .capture(&SnapshotRepo::new(conn))
            .map_err(|e| {
                self.phase = ApplyPhase::Idle;
                e.with_trace_id(self.trace_id.clone())
            })?;

        self.enter(ApplyPhase::Applying);
        tracing::info!(
            trace_id = %self.trace_id,
            snapshot_id = %snapshot.id,
            pending_count = pending.len(),
            "applying pending changes"
        );
        // Backups are named after the snapshot so recovery can find them
        let ctx = ApplyContext::new(engine.runner, &engine.files, snapshot.created_at);
        let mut applied = Vec::with_capacity(pending.len());
        for change in &pending {
            if let Err(cause) = self.check_deadline().and_then(|()| self.apply_one(change, &ctx)) {
                return Err(self.fail(ExErrorKind::ApplyFailed, Some(change), &snapshot, cause));
            }
            applied.push(change.id.clone());
        }

        if let Err(cause) = self.check_deadline() {
            return Err(self.fail(ExErrorKind::ApplyFailed, None, &snapshot, cause));
        }
        self.enter(ApplyPhase::Reloading);
        let reload = match reload_networking(engine.runner) {
            Ok(strategy) => strategy,
            Err(cause) => {
                return Err(self.fail(ExErrorKind::ReloadFailed, None, &snapshot, cause));
            }
        };

        if let Err(cause) = commit(conn, &pending, &snapshot.id) {
            return Err(self.fail(ExErrorKind::ApplyFailed, None, &snapshot, cause));
        }
        self.enter(ApplyPhase::Committed);
        remove_backups(OP, &engine.files, &snapshot);

        Ok(ApplyReport {
            trace_id: self.trace_id.clone(),
            snapshot_id: snapshot.id,
            applied,
            reload,
            duration_ms: self.started.elapsed().as_millis() as u64,
        })
    }

    fn apply_one(&self, change: &PendingChange, ctx: &ApplyContext<'_>) -> Result<()> {
        tracing::debug!(
            trace_id = %self.trace_id,
            change_id = %change.id,
            change_type = %change.change_type,
            resource_id = %change.resource_id,
            action = %change.action,
            "applying change"
        );
        self.engine
            .registry
            .get(change.change_type)
            .and_then(|applier| applier.apply(change, ctx))
            .map_err(|e| ExError::from(e).with_change_id(&change.id))
    }

    fn check_deadline(&self) -> Result<()> {
        match self.engine.deadline {
            Some(deadline) if self.started.elapsed() >= deadline => {
                Err(ExError::new(ExErrorKind::Timeout)
                    .with_op(OP)
                    .with_message(format!("apply exceeded its deadline of {:?}", deadline)))
            }
            _ => Ok(()),
        }
    }

    /// Roll back and build the error returned to the caller
    fn fail(
        &mut self,
        kind: ExErrorKind,
        change: Option<&PendingChange>,
        snapshot: &NetworkSnapshot,
        cause: ExError,
    ) -> ExError {
        let what = match (change, kind) {
            (Some(change), _) => format!("failed to apply change {}", change.label()),
            (None, ExErrorKind::ReloadFailed) => "networking reload failed".to_string(),
            (None, _) => "apply could not be completed".to_string(),
        };
        tracing::warn!(
            trace_id = %self.trace_id,
            snapshot_id = %snapshot.id,
            error = %cause,
            "{}; rolling back",
            what
        );

        let (conn, engine) = (self.conn, self.engine);
        let ledger = ChangeLedger::new(conn);
        if let Some(change) = change {
            if let Err(e) = ledger.record_failure(&change.id, &cause.to_string()) {
                tracing::warn!(change_id = %change.id, error = %e, "could not record failure");
            }
        }

        self.enter(ApplyPhase::RollingBack);
        let outcome = RollbackEngine::new(engine.runner, &engine.files).rollback(conn, &snapshot.id);

        let err = match outcome {
            Ok(report) => {
                self.enter(ApplyPhase::RolledBack);
                let mut message = format!("{} (rolled back)", what);
                if !report.is_clean() {
                    message.push_str(&format!(
                        "; rollback warnings: {}",
                        report.warnings.join("; ")
                    ));
                }
                ExError::new(kind).with_message(message).with_source(cause)
            }
            Err(rollback_err) => {
                if let Some(change) = change {
                    if let Err(e) = ledger.mark_failed(&change.id) {
                        tracing::warn!(change_id = %change.id, error = %e, "could not mark change failed");
                    }
                }
                tracing::error!(
                    trace_id = %self.trace_id,
                    snapshot_id = %snapshot.id,
                    error = %rollback_err,
                    "rollback failed; manual intervention required"
                );
                ExError::new(ExErrorKind::RollbackFailed)
                    .with_message(format!(
                        "{}; rollback failed, manual intervention required: {}",
                        what, rollback_err
                    ))
                    .with_source(cause)
            }
        };

        let err = err
            .with_op(OP)
            .with_snapshot_id(&snapshot.id)
            .with_trace_id(self.trace_id.clone());
        match change {
            Some(change) => err.with_change_id(&change.id),
            None => err,
        }
    }
}

/// Write the outcome of a successful transaction in one SQL transaction
fn commit(conn: &Connection, pending: &[PendingChange], snapshot_id: &str) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(from_rusqlite)?;

    let ids: Vec<String> = pending.iter().map(|c| c.id.clone()).collect();
    ChangeLedger::new(&tx).mark_applied_batch(&ids)?;

    let resources = ResourceRepo::new(&tx);
    for change in pending {
        record_definition(&resources, change)?;
    }

    SnapshotRepo::new(&tx).mark_applied(snapshot_id)?;
    tx.commit().map_err(from_rusqlite)
}

fn record_definition(repo: &ResourceRepo<'_>, change: &PendingChange) -> Result<()> {
    let name = change.resource_id.as_str();
    match (&change.pending_config, change.action) {
        (ChangeConfig::Bridge(_), ChangeAction::Delete) => repo.delete_bridge(name).map(|_| ()),
        (ChangeConfig::Bridge(cfg), _) => repo.upsert_bridge(&PersistentBridge::new(name, cfg.clone())),
        (ChangeConfig::Interface(_), ChangeAction::Delete) => {
            repo.delete_interface(name).map(|_| ())
        }
        (ChangeConfig::Interface(cfg), _) => {
            repo.upsert_interface(&PersistentInterface::new(name, cfg.clone()))
        }
        _ => Ok(()),
    }
}

/// Apply every pending change with a fresh orchestrator
///
/// # Errors
///
/// See [`ApplyOrchestrator::run`].
pub fn apply_pending(conn: &Connection, engine: &EngineContext<'_>) -> Result<ApplyReport> {
    ApplyOrchestrator::new(conn, engine).run()
}
