//! Stage command
//!
//! Usage: netstage stage --type bridge --action create --resource br0 --pending '{"ports":["eth0"]}'

use crate::commands::{open_session, CliResult, GlobalArgs};
use clap::Args;
use netstage_core::model::{ChangeAction, ChangeConfig, ChangeType, NewChange};
use netstage_core::SystemRunner;
use netstage_engine::{apply_engine_command, EngineCommand, EngineCommandResult, EngineContext};

#[derive(Debug, Args)]
pub struct StageArgs {
    /// bridge, interface, route, firewall or dns
    #[arg(long = "type", value_name = "TYPE")]
    pub change_type: String,

    /// create, update or delete
    #[arg(long)]
    pub action: String,

    /// Resource name (bridge or interface name, route destination, rule id)
    #[arg(long)]
    pub resource: String,

    /// Desired configuration as a JSON object
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub pending: String,

    /// Configuration before the change, as a JSON object
    #[arg(long, value_name = "JSON")]
    pub current: Option<String>,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Lower values apply first
    #[arg(long)]
    pub priority: Option<i64>,
}

pub fn execute(args: StageArgs, global: &GlobalArgs) -> CliResult {
    let change_type: ChangeType = args.change_type.parse()?;
    let action: ChangeAction = args.action.parse()?;

    let mut change = NewChange::new(
        action,
        args.resource,
        ChangeConfig::from_json(change_type, &args.pending)?,
    )
    .with_description(args.description);
    if let Some(current) = &args.current {
        change = change.with_current_config(ChangeConfig::from_json(change_type, current)?);
    }
    if let Some(priority) = args.priority {
        change = change.with_priority(priority);
    }

    let session = open_session(global)?;
    let engine = EngineContext::from_config(&SystemRunner, &session.config);
    match apply_engine_command(EngineCommand::Stage(change), &session.conn, &engine)? {
        EngineCommandResult::Staged(staged) => {
            println!("Change staged:");
            println!("  id: {}", staged.id);
            println!("  change: {}", staged.label());
            println!("  priority: {}", staged.priority);
        }
        other => return Err(format!("unexpected engine result: {:?}", other).into()),
    }
    Ok(())
}
