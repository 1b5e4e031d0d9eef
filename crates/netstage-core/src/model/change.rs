//! Pending change model
//!
//! A `PendingChange` is one proposed mutation of host network configuration.
//! Changes are staged into the ledger, ordered by `(priority, created_at)`,
//! and applied together as a single transaction.

use crate::errors::{NetStageError, Result};
use crate::model::payload::ChangeConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority assigned to changes staged without an explicit one
pub const DEFAULT_PRIORITY: i64 = 100;

/// Kind of network resource a change targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Bridge,
    Interface,
    Route,
    Firewall,
    Dns,
}

impl ChangeType {
    pub const ALL: [ChangeType; 5] = [
        ChangeType::Bridge,
        ChangeType::Interface,
        ChangeType::Route,
        ChangeType::Firewall,
        ChangeType::Dns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Bridge => "bridge",
            ChangeType::Interface => "interface",
            ChangeType::Route => "route",
            ChangeType::Firewall => "firewall",
            ChangeType::Dns => "dns",
        }
    }
}

impl FromStr for ChangeType {
    type Err = NetStageError;

    fn from_str(s: &str) -> Result<Self> {
        ChangeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| NetStageError::UnknownChangeType {
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the change does to its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        }
    }
}

impl FromStr for ChangeAction {
    type Err = NetStageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(ChangeAction::Create),
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            other => Err(NetStageError::UnknownAction {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a staged change
///
/// Only `Pending` changes participate in an apply. The other three are
/// terminal; nothing transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Applied,
    Failed,
    Discarded,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Applied => "applied",
            ChangeStatus::Failed => "failed",
            ChangeStatus::Discarded => "discarded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChangeStatus::Pending)
    }
}

impl FromStr for ChangeStatus {
    type Err = NetStageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ChangeStatus::Pending),
            "applied" => Ok(ChangeStatus::Applied),
            "failed" => Ok(ChangeStatus::Failed),
            "discarded" => Ok(ChangeStatus::Discarded),
            other => Err(NetStageError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change as stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    /// Opaque unique identifier (UUIDv7)
    pub id: String,
    pub change_type: ChangeType,
    pub action: ChangeAction,
    /// Name of the targeted resource: interface, bridge, route destination,
    /// firewall rule label or `resolv.conf`
    pub resource_id: String,
    /// Configuration observed before the change was first staged
    pub current_config: Option<ChangeConfig>,
    /// Proposed configuration
    pub pending_config: ChangeConfig,
    pub description: String,
    /// Lower applies first
    pub priority: i64,
    pub status: ChangeStatus,
    /// Reason the change failed during its last apply attempt
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingChange {
    /// Label used in operator-facing messages
    pub fn label(&self) -> String {
        if self.description.trim().is_empty() {
            format!("{} {} {}", self.action, self.change_type, self.resource_id)
        } else {
            self.description.clone()
        }
    }
}

/// Request to stage a change into the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewChange {
    pub change_type: ChangeType,
    pub action: ChangeAction,
    pub resource_id: String,
    pub description: String,
    pub pending_config: ChangeConfig,
    pub current_config: Option<ChangeConfig>,
    /// Falls back to the ledger's default priority when unset
    pub priority: Option<i64>,
}

impl NewChange {
    pub fn new(
        action: ChangeAction,
        resource_id: impl Into<String>,
        pending_config: ChangeConfig,
    ) -> Self {
        Self {
            change_type: pending_config.change_type(),
            action,
            resource_id: resource_id.into(),
            description: String::new(),
            pending_config,
            current_config: None,
            priority: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_current_config(mut self, current: ChangeConfig) -> Self {
        self.current_config = Some(current);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Reject changes that could never be applied
    ///
    /// # Errors
    ///
    /// Returns an error when the resource id is blank, the config payload
    /// belongs to another change type, the action is unsupported for the
    /// type, or the payload itself fails validation.
    pub fn validate(&self) -> Result<()> {
        let resource_id = self.resource_id.trim();
        if resource_id.is_empty() {
            return Err(NetStageError::InvalidResourceId {
                resource_id: self.resource_id.clone(),
                reason: "resource id cannot be empty".to_string(),
            });
        }
        if resource_id.chars().any(char::is_whitespace)
            && !matches!(self.change_type, ChangeType::Firewall)
        {
            return Err(NetStageError::InvalidResourceId {
                resource_id: self.resource_id.clone(),
                reason: "resource id cannot contain whitespace".to_string(),
            });
        }

        for config in std::iter::once(&self.pending_config).chain(self.current_config.as_ref()) {
            if config.change_type() != self.change_type {
                return Err(NetStageError::InvalidConfig {
                    change_type: self.change_type,
                    reason: format!("payload describes a {} resource", config.change_type()),
                });
            }
        }

        match (self.change_type, self.action) {
            (ChangeType::Route, ChangeAction::Update) => {
                return Err(NetStageError::UnsupportedAction {
                    change_type: self.change_type,
                    action: self.action,
                    hint: "stage a delete followed by a create".to_string(),
                })
            }
            (ChangeType::Firewall, ChangeAction::Update) => {
                return Err(NetStageError::UnsupportedAction {
                    change_type: self.change_type,
                    action: self.action,
                    hint: "stage a delete of the old rule and a create of the new one"
                        .to_string(),
                })
            }
            (ChangeType::Dns, ChangeAction::Delete) => {
                return Err(NetStageError::UnsupportedAction {
                    change_type: self.change_type,
                    action: self.action,
                    hint: "stage an update with the desired nameservers".to_string(),
                })
            }
            _ => {}
        }

        self.pending_config.validate(self.action)
    }
}
