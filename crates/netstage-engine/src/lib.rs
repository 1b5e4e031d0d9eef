//! netstage engine - transactional application of staged network changes
//!
//! Coordinates the core domain logic and the persistence layer:
//! - Snapshot capture before the first host mutation
//! - The apply transaction and its rollback path
//! - Boot-time restore of persisted definitions and recovery of
//!   transactions interrupted mid-flight
//! - Dry-run planning against a simulated host

pub mod capture;
pub mod commands;
pub mod reload;
pub mod rollback;

pub use capture::SnapshotCapturer;
pub use commands::apply::{apply_pending, ApplyOrchestrator, ApplyPhase, ApplyReport};
pub use commands::engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
pub use commands::EngineContext;
pub use reload::ReloadStrategy;
pub use rollback::{RollbackEngine, RollbackReport};
