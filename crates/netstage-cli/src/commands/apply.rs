//! Apply and plan commands

use crate::commands::{open_session, CliResult, GlobalArgs};
use clap::Args;
use netstage_core::SystemRunner;
use netstage_engine::{apply_engine_command, EngineCommand, EngineCommandResult, EngineContext};

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute_apply(args: ApplyArgs, global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let engine = EngineContext::from_config(&SystemRunner, &session.config);

    match apply_engine_command(EngineCommand::Apply, &session.conn, &engine)? {
        EngineCommandResult::Applied(report) if args.json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        EngineCommandResult::Applied(report) => {
            println!("Changes applied:");
            println!("  trace_id: {}", report.trace_id);
            println!("  snapshot_id: {}", report.snapshot_id);
            println!("  applied: {}", report.applied.len());
            println!("  reload: {}", report.reload);
            println!("  duration_ms: {}", report.duration_ms);
        }
        other => return Err(format!("unexpected engine result: {:?}", other).into()),
    }
    Ok(())
}

pub fn execute_plan(args: ApplyArgs, global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let engine = EngineContext::from_config(&SystemRunner, &session.config);

    let plans = match apply_engine_command(EngineCommand::Plan, &session.conn, &engine)? {
        EngineCommandResult::Planned(plans) => plans,
        other => return Err(format!("unexpected engine result: {:?}", other).into()),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }
    if plans.is_empty() {
        println!("Nothing pending.");
        return Ok(());
    }

    for plan in &plans {
        println!("{} ({})", plan.label, plan.change_id);
        for command in &plan.commands {
            println!("  $ {}", command);
        }
        for path in &plan.rewrites {
            println!("  rewrite {}", path.display());
        }
        if let Some(error) = &plan.error {
            println!("  would fail: {}", error);
            println!("  (later changes not planned; apply would roll back)");
        }
    }
    Ok(())
}
