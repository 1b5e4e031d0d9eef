//! Dry-run planning
//!
//! Rehearses the pending changes against a `SimulatedHost` seeded from a
//! live probe, with the host files copied into a scratch directory. The
//! real host only sees read-only probe commands and the ledger is untouched.

#![allow(clippy::result_large_err)]

use crate::capture::SnapshotCapturer;
use crate::commands::EngineContext;
use netstage_core::appliers::ApplyContext;
use netstage_core::config::HostFiles;
use netstage_core::errors::NetStageError;
use netstage_core::files::read_optional;
use netstage_core::host::SimulatedHost;
use netstage_core::model::PendingChange;
use netstage_store::errors::Result;
use netstage_store::ChangeLedger;
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;

/// What applying one change would do
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangePlan {
    pub change_id: String,
    pub label: String,
    /// Mutating host commands, in order
    pub commands: Vec<String>,
    /// Host files whose content would change
    pub rewrites: Vec<PathBuf>,
    /// Why the applier would fail; later changes are not planned
    pub error: Option<String>,
}

/// Plan every pending change in ledger order
///
/// # Errors
///
/// Returns `SnapshotFailed` when live state cannot be probed, or `Io` when
/// the scratch directory cannot be prepared.
pub fn plan_pending(conn: &Connection, engine: &EngineContext<'_>) -> Result<Vec<ChangePlan>> {
    let pending = ChangeLedger::new(conn).list_pending()?;
    if pending.is_empty() {
        return Ok(Vec::new());
    }

    let live = SnapshotCapturer::new(engine.runner, &engine.files).probe()?;
    let rehearsal = SimulatedHost::from_state(&live);

    let scratch = tempfile::tempdir().map_err(|e| NetStageError::io(std::env::temp_dir(), e))?;
    let scratch_files = HostFiles::in_dir(scratch.path());
    seed(&scratch_files.interfaces, live.interfaces_file.as_deref())?;
    seed(&scratch_files.resolv_conf, live.resolv_conf.as_deref())?;

    let ctx = ApplyContext::new(&rehearsal, &scratch_files, chrono::Utc::now());
    let mut plans = Vec::with_capacity(pending.len());
    for change in &pending {
        let plan = rehearse(change, engine, &ctx, &rehearsal, &scratch_files)?;
        let failed = plan.error.is_some();
        plans.push(plan);
        if failed {
            break;
        }
    }
    Ok(plans)
}

fn rehearse(
    change: &PendingChange,
    engine: &EngineContext<'_>,
    ctx: &ApplyContext<'_>,
    rehearsal: &SimulatedHost,
    scratch: &HostFiles,
) -> Result<ChangePlan> {
    let start = rehearsal.transcript_len();
    let before = file_contents(scratch)?;

    let outcome = engine
        .registry
        .get(change.change_type)
        .and_then(|applier| applier.apply(change, ctx));

    let after = file_contents(scratch)?;
    let targets = [&engine.files.interfaces, &engine.files.resolv_conf];
    let rewrites = targets
        .iter()
        .zip(before.iter().zip(after.iter()))
        .filter(|(_, (b, a))| b != a)
        .map(|(path, _)| (*path).clone())
        .collect();

    Ok(ChangePlan {
        change_id: change.id.clone(),
        label: change.label(),
        commands: rehearsal
            .mutations_since(start)
            .iter()
            .map(|c| c.to_string())
            .collect(),
        rewrites,
        error: outcome.err().map(|e| e.to_string()),
    })
}

fn seed(path: &std::path::Path, content: Option<&str>) -> Result<()> {
    if let Some(content) = content {
        std::fs::write(path, content).map_err(|e| NetStageError::io(path, e))?;
    }
    Ok(())
}

fn file_contents(files: &HostFiles) -> Result<[Option<String>; 2]> {
    Ok([
        read_optional(&files.interfaces)?,
        read_optional(&files.resolv_conf)?,
    ])
}
