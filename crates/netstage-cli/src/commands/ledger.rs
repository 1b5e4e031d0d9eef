//! Pending and discard commands

use crate::commands::{open_session, CliResult, GlobalArgs};
use clap::Args;
use netstage_core::model::PendingChange;
use netstage_core::SystemRunner;
use netstage_engine::{apply_engine_command, EngineCommand, EngineCommandResult, EngineContext};
use netstage_store::ChangeLedger;

#[derive(Debug, Args)]
pub struct PendingArgs {
    /// Include applied, failed and discarded entries
    #[arg(long)]
    pub all: bool,

    /// Maximum entries shown with --all
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DiscardArgs {
    #[arg(long, conflicts_with = "all", required_unless_present = "all")]
    pub id: Option<String>,

    /// Discard every pending change
    #[arg(long)]
    pub all: bool,
}

pub fn execute_pending(args: PendingArgs, global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let ledger = ChangeLedger::new(&session.conn);
    let changes = if args.all {
        ledger.list_recent(args.limit)?
    } else {
        ledger.list_pending()?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }
    if changes.is_empty() {
        println!("No staged changes.");
        return Ok(());
    }
    for change in &changes {
        print_change(change);
    }
    Ok(())
}

fn print_change(change: &PendingChange) {
    println!(
        "{}  {:<9} {:<9} {:<6} {:<16} priority={}",
        change.id,
        change.status.as_str(),
        change.change_type.as_str(),
        change.action.as_str(),
        change.resource_id,
        change.priority
    );
    if let Some(error) = &change.last_error {
        println!("    last error: {}", error);
    }
}

pub fn execute_discard(args: DiscardArgs, global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let engine = EngineContext::from_config(&SystemRunner, &session.config);
    let cmd = match args.id {
        Some(change_id) => EngineCommand::Discard { change_id },
        None => EngineCommand::DiscardAll,
    };
    match apply_engine_command(cmd, &session.conn, &engine)? {
        EngineCommandResult::Discarded { count } => println!("Discarded {} change(s).", count),
        other => return Err(format!("unexpected engine result: {:?}", other).into()),
    }
    Ok(())
}
