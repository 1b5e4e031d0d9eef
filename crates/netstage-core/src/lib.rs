//! netstage core - staged network reconfiguration primitives
//!
//! This crate holds everything below the persistence and orchestration
//! layers:
//! - Change, snapshot and resource models with their JSON payloads
//! - The host command seam (`CommandRunner`) with a live runner and an
//!   in-memory simulated host
//! - Parsers and renderers for `/etc/network/interfaces` and `resolv.conf`
//! - Per-type appliers that turn one pending change into host commands
//! - Error taxonomy, logging facility and daemon configuration

pub mod appliers;
pub mod config;
pub mod errors;
pub mod files;
pub mod host;
pub mod logging_facility;
pub mod model;

pub use netstage_core_types as core_types;

pub use appliers::{Applier, ApplierRegistry, ApplyContext};
pub use config::{HostFiles, NetStageConfig};
pub use errors::{ExError, ExErrorKind, NetStageError, Result};
pub use host::{CommandOutput, CommandRunner, HostCommand, SimulatedHost, SystemRunner};
pub use model::{
    ChangeAction, ChangeConfig, ChangeStatus, ChangeType, NetworkSnapshot, NetworkState, NewChange,
    PendingChange, SnapshotStatus,
};
