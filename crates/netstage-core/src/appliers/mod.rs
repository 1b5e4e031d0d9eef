//! Resource appliers
//!
//! One `Applier` per change type turns a pending change into host commands
//! and file edits. Appliers check live state first and skip work that is
//! already done, so re-running a change is harmless.

pub mod bridge;
pub mod dns;
pub mod firewall;
pub mod interface;
pub mod route;

use crate::config::HostFiles;
use crate::errors::{NetStageError, Result};
use crate::files::{self, InterfacesFile};
use crate::host::{run_checked, CommandRunner, HostCommand};
use crate::model::{ChangeConfig, ChangeType, PendingChange};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

pub use bridge::BridgeApplier;
pub use dns::DnsApplier;
pub use firewall::FirewallApplier;
pub use interface::InterfaceApplier;
pub use route::RouteApplier;

/// Everything an applier may touch while applying one change
pub struct ApplyContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub files: &'a HostFiles,
    /// Start of the enclosing transaction; names file backups
    pub started_at: DateTime<Utc>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, files: &'a HostFiles, started_at: DateTime<Utc>) -> Self {
        Self {
            runner,
            files,
            started_at,
        }
    }

    /// Run a command, failing on non-zero exit
    ///
    /// # Errors
    ///
    /// Returns `HostCommandFailed` or `HostCommandSpawn`.
    pub fn run(&self, command: HostCommand) -> Result<String> {
        run_checked(self.runner, &command)
    }

    /// Load, edit and rewrite the interfaces file
    ///
    /// A missing file is treated as empty. The original is backed up before
    /// the first rewrite of the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `InterfacesParse`.
    pub fn edit_interfaces(&self, edit: impl FnOnce(&mut InterfacesFile)) -> Result<()> {
        let path = &self.files.interfaces;
        let mut file = match files::read_optional(path)? {
            Some(text) => InterfacesFile::parse(&text)?,
            None => InterfacesFile::default(),
        };
        edit(&mut file);
        files::write_with_backup(path, &file.render(), self.started_at)?;
        Ok(())
    }
}

/// Applies one kind of pending change to the host
pub trait Applier {
    fn change_type(&self) -> ChangeType;

    /// Bring the host to the state the change describes
    ///
    /// # Errors
    ///
    /// Any error fails the whole transaction.
    fn apply(&self, change: &PendingChange, ctx: &ApplyContext<'_>) -> Result<()>;
}

/// Appliers keyed by the change type they handle
pub struct ApplierRegistry {
    appliers: HashMap<ChangeType, Box<dyn Applier>>,
}

impl ApplierRegistry {
    pub fn empty() -> Self {
        Self {
            appliers: HashMap::new(),
        }
    }

    /// Registry with the built-in applier for every change type
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(BridgeApplier));
        registry.register(Box::new(InterfaceApplier));
        registry.register(Box::new(RouteApplier));
        registry.register(Box::new(FirewallApplier));
        registry.register(Box::new(DnsApplier));
        registry
    }

    /// Register an applier, replacing any previous one for its type
    pub fn register(&mut self, applier: Box<dyn Applier>) {
        self.appliers.insert(applier.change_type(), applier);
    }

    /// # Errors
    ///
    /// Returns `ApplierMissing` when nothing handles `change_type`.
    pub fn get(&self, change_type: ChangeType) -> Result<&dyn Applier> {
        self.appliers
            .get(&change_type)
            .map(|a| &**a)
            .ok_or(NetStageError::ApplierMissing { change_type })
    }
}

impl Default for ApplierRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn payload_mismatch(change: &PendingChange) -> NetStageError {
    NetStageError::InvalidConfig {
        change_type: change.change_type,
        reason: format!(
            "change {} carries a {} payload",
            change.id,
            change.pending_config.change_type()
        ),
    }
}

pub(crate) fn bridge_payload(change: &PendingChange) -> Result<&crate::model::BridgeConfig> {
    match &change.pending_config {
        ChangeConfig::Bridge(cfg) => Ok(cfg),
        _ => Err(payload_mismatch(change)),
    }
}

pub(crate) fn interface_payload(change: &PendingChange) -> Result<&crate::model::InterfaceConfig> {
    match &change.pending_config {
        ChangeConfig::Interface(cfg) => Ok(cfg),
        _ => Err(payload_mismatch(change)),
    }
}

pub(crate) fn route_payload(change: &PendingChange) -> Result<&crate::model::RouteConfig> {
    match &change.pending_config {
        ChangeConfig::Route(cfg) => Ok(cfg),
        _ => Err(payload_mismatch(change)),
    }
}

pub(crate) fn firewall_payload(change: &PendingChange) -> Result<&crate::model::FirewallRule> {
    match &change.pending_config {
        ChangeConfig::Firewall(rule) => Ok(rule),
        _ => Err(payload_mismatch(change)),
    }
}

pub(crate) fn dns_payload(change: &PendingChange) -> Result<&crate::model::DnsConfig> {
    match &change.pending_config {
        ChangeConfig::Dns(cfg) => Ok(cfg),
        _ => Err(payload_mismatch(change)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::{ChangeAction, ChangeStatus, DEFAULT_PRIORITY};

    pub fn change(action: ChangeAction, resource_id: &str, config: ChangeConfig) -> PendingChange {
        let now = Utc::now();
        PendingChange {
            id: format!("test-{}", resource_id),
            change_type: config.change_type(),
            action,
            resource_id: resource_id.to_string(),
            current_config: None,
            pending_config: config,
            description: String::new(),
            priority: DEFAULT_PRIORITY,
            status: ChangeStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_type() {
        let registry = ApplierRegistry::standard();
        for t in ChangeType::ALL {
            assert_eq!(registry.get(t).unwrap().change_type(), t);
        }
    }

    #[test]
    fn test_empty_registry_reports_missing_applier() {
        let registry = ApplierRegistry::empty();
        assert!(matches!(
            registry.get(ChangeType::Dns),
            Err(NetStageError::ApplierMissing {
                change_type: ChangeType::Dns
            })
        ));
    }
}
