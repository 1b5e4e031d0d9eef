//! Engine-level commands that touch the ledger or the host.

#![allow(clippy::result_large_err)]

use crate::commands::apply::{apply_pending, ApplyReport};
use crate::commands::plan::{plan_pending, ChangePlan};
use crate::commands::recover::{recover_interrupted, RecoveryReport};
use crate::commands::restore::{restore_persisted, RestoreReport};
use crate::commands::EngineContext;
use netstage_core::model::{NewChange, PendingChange};
use netstage_store::errors::Result;
use netstage_store::ChangeLedger;
use rusqlite::Connection;

/// Engine-level commands that require I/O (database, host).
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Stage a change, or update the pending entry for the same resource.
    Stage(NewChange),
    /// Discard one pending change.
    Discard { change_id: String },
    /// Discard every pending change.
    DiscardAll,
    /// Apply every pending change as one transaction.
    Apply,
    /// Rehearse pending changes without touching the host.
    Plan,
    /// Bring up persisted autostart bridges and interfaces.
    RestorePersisted,
    /// Roll back transactions left active by a crash.
    RecoverInterrupted,
}

/// Result of applying an engine command.
#[derive(Debug, Clone)]
pub enum EngineCommandResult {
    Staged(PendingChange),
    Discarded { count: usize },
    Applied(ApplyReport),
    Planned(Vec<ChangePlan>),
    Restored(RestoreReport),
    Recovered(RecoveryReport),
}

/// Apply an engine command against the store and the host.
///
/// # Errors
///
/// Propagates the error of the dispatched operation unchanged.
pub fn apply_engine_command(
    cmd: EngineCommand,
    conn: &Connection,
    engine: &EngineContext<'_>,
) -> Result<EngineCommandResult> {
    let ledger = ChangeLedger::new(conn).with_default_priority(engine.default_priority);
    match cmd {
        EngineCommand::Stage(change) => ledger.stage(change).map(EngineCommandResult::Staged),
        EngineCommand::Discard { change_id } => {
            ledger.discard(&change_id)?;
            Ok(EngineCommandResult::Discarded { count: 1 })
        }
        EngineCommand::DiscardAll => ledger
            .discard_all()
            .map(|count| EngineCommandResult::Discarded { count }),
        EngineCommand::Apply => apply_pending(conn, engine).map(EngineCommandResult::Applied),
        EngineCommand::Plan => plan_pending(conn, engine).map(EngineCommandResult::Planned),
        EngineCommand::RestorePersisted => {
            restore_persisted(conn, engine.runner).map(EngineCommandResult::Restored)
        }
        EngineCommand::RecoverInterrupted => {
            recover_interrupted(conn, engine).map(EngineCommandResult::Recovered)
        }
    }
}
