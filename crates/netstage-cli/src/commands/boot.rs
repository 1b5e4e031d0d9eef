//! Startup commands: recover interrupted transactions, restore definitions

use crate::commands::{open_session, CliResult, GlobalArgs};
use netstage_core::SystemRunner;
use netstage_engine::{apply_engine_command, EngineCommand, EngineCommandResult, EngineContext};

pub fn execute_recover(global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let engine = EngineContext::from_config(&SystemRunner, &session.config);

    let report = match apply_engine_command(EngineCommand::RecoverInterrupted, &session.conn, &engine)? {
        EngineCommandResult::Recovered(report) => report,
        other => return Err(format!("unexpected engine result: {:?}", other).into()),
    };
    if report.rolled_back.is_empty() && report.failed.is_empty() {
        println!("No interrupted transactions.");
        return Ok(());
    }
    for rollback in &report.rolled_back {
        println!(
            "Rolled back {} ({} change(s) discarded)",
            rollback.snapshot_id, rollback.discarded
        );
        for warning in &rollback.warnings {
            println!("  warning: {}", warning);
        }
    }
    for (snapshot_id, err) in &report.failed {
        println!("Rollback of {} failed: {}", snapshot_id, err);
    }
    if !report.failed.is_empty() {
        return Err("manual intervention required".into());
    }
    Ok(())
}

pub fn execute_restore(global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let engine = EngineContext::from_config(&SystemRunner, &session.config);

    let report = match apply_engine_command(EngineCommand::RestorePersisted, &session.conn, &engine)? {
        EngineCommandResult::Restored(report) => report,
        other => return Err(format!("unexpected engine result: {:?}", other).into()),
    };
    println!(
        "Restored {} bridge(s), {} interface(s).",
        report.bridges_restored.len(),
        report.interfaces_restored.len()
    );
    for (name, error) in report.bridges_failed.iter().chain(&report.interfaces_failed) {
        println!("  {} failed: {}", name, error);
    }
    Ok(())
}
