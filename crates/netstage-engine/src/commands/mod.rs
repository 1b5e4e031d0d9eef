//! Command orchestration layer.
//!
//! Provides high-level command functions that coordinate between
//! core domain logic, the host and the persistence layer.

pub mod apply;
pub mod engine_command;
pub mod plan;
pub mod recover;
pub mod restore;

use netstage_core::config::{HostFiles, NetStageConfig};
use netstage_core::host::CommandRunner;
use netstage_core::model::change::DEFAULT_PRIORITY;
use netstage_core::ApplierRegistry;
use std::time::Duration;

/// Host access and settings shared by every engine command
pub struct EngineContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub files: HostFiles,
    pub registry: ApplierRegistry,
    /// Upper bound on one apply transaction
    pub deadline: Option<Duration>,
    pub default_priority: i64,
}

impl<'a> EngineContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, files: HostFiles) -> Self {
        Self {
            runner,
            files,
            registry: ApplierRegistry::standard(),
            deadline: None,
            default_priority: DEFAULT_PRIORITY,
        }
    }

    pub fn from_config(runner: &'a dyn CommandRunner, config: &NetStageConfig) -> Self {
        Self::new(runner, config.host_files())
            .with_deadline(config.apply_deadline())
            .with_default_priority(config.default_priority)
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_registry(mut self, registry: ApplierRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_default_priority(mut self, priority: i64) -> Self {
        self.default_priority = priority;
        self
    }
}
