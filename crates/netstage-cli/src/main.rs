//! netstage CLI
//!
//! Command-line interface for staging and applying network changes

use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "netstage")]
#[command(about = "netstage - Transactional network reconfiguration", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: commands::GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Stage a change for the next apply
    Stage(commands::stage::StageArgs),
    /// List staged changes
    Pending(commands::ledger::PendingArgs),
    /// Discard staged changes
    Discard(commands::ledger::DiscardArgs),
    /// Apply every pending change as one transaction
    Apply(commands::apply::ApplyArgs),
    /// Show the host commands pending changes would issue
    Plan(commands::apply::ApplyArgs),
    /// List network snapshots
    Snapshots(commands::snapshots::SnapshotsArgs),
    /// List persisted bridge and interface definitions
    Resources,
    /// Bring up persisted autostart bridges and interfaces
    Restore,
    /// Roll back transactions interrupted by a crash
    Recover,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Stage(args) => commands::stage::execute(args, &cli.global),
        Commands::Pending(args) => commands::ledger::execute_pending(args, &cli.global),
        Commands::Discard(args) => commands::ledger::execute_discard(args, &cli.global),
        Commands::Apply(args) => commands::apply::execute_apply(args, &cli.global),
        Commands::Plan(args) => commands::apply::execute_plan(args, &cli.global),
        Commands::Snapshots(args) => commands::snapshots::execute(args, &cli.global),
        Commands::Resources => commands::snapshots::execute_resources(&cli.global),
        Commands::Restore => commands::boot::execute_restore(&cli.global),
        Commands::Recover => commands::boot::execute_recover(&cli.global),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
