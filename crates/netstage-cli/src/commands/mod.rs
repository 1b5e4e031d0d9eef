//! Subcommand implementations and the setup they share

pub mod apply;
pub mod boot;
pub mod ledger;
pub mod snapshots;
pub mod stage;

use clap::Args;
use netstage_core::config::{NetStageConfig, DEFAULT_CONFIG_PATH};
use netstage_core::logging_facility;
use rusqlite::Connection;
use std::path::PathBuf;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Database path, overriding the configuration file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

/// Loaded configuration and an open, migrated store
pub struct Session {
    pub config: NetStageConfig,
    pub conn: Connection,
}

/// Load configuration, start logging and open the store
pub fn open_session(global: &GlobalArgs) -> Result<Session, Box<dyn std::error::Error>> {
    let mut config = NetStageConfig::load_or_default(&global.config)?;
    if let Some(db) = &global.db {
        config.database_path = db.clone();
    }
    logging_facility::init(config.log_profile);

    let conn = netstage_store::db::open_store(&config.database_path)?;
    tracing::debug!(db = %config.database_path.display(), "store opened");
    Ok(Session { config, conn })
}
