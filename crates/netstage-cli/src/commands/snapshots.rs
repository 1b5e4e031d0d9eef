//! Snapshot and resource listings

use crate::commands::{open_session, CliResult, GlobalArgs};
use clap::Args;
use netstage_store::{ResourceRepo, SnapshotRepo};

#[derive(Debug, Args)]
pub struct SnapshotsArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Show the recorded state of one snapshot as JSON
    #[arg(long)]
    pub show: Option<String>,
}

pub fn execute(args: SnapshotsArgs, global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let repo = SnapshotRepo::new(&session.conn);

    if let Some(id) = args.show {
        let snapshot = repo.get(&id)?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let snapshots = repo.list(args.limit)?;
    if snapshots.is_empty() {
        println!("No snapshots.");
    }
    for snapshot in snapshots {
        println!(
            "{}  {:<11} created={} interfaces={}",
            snapshot.id,
            snapshot.status.as_str(),
            snapshot.created_at.to_rfc3339(),
            snapshot.state.interface_states.len()
        );
    }
    Ok(())
}

pub fn execute_resources(global: &GlobalArgs) -> CliResult {
    let session = open_session(global)?;
    let repo = ResourceRepo::new(&session.conn);

    let bridges = repo.list_bridges()?;
    let interfaces = repo.list_interfaces()?;
    if bridges.is_empty() && interfaces.is_empty() {
        println!("No persisted resources.");
        return Ok(());
    }
    for bridge in bridges {
        println!(
            "bridge    {:<12} status={} ports={} autostart={}",
            bridge.name,
            bridge.status.as_str(),
            bridge.config.ports.join(","),
            bridge.config.autostart
        );
        if let Some(error) = bridge.last_error {
            println!("    last error: {}", error);
        }
    }
    for iface in interfaces {
        println!(
            "interface {:<12} method={} autostart={}",
            iface.name,
            iface.method().as_str(),
            iface.config.autostart
        );
    }
    Ok(())
}
