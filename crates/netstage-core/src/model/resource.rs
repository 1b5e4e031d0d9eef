//! Persistent resource definitions
//!
//! Successful applies leave behind a definition of each bridge and interface
//! they created, so the host can be restored at boot.

use crate::model::payload::{AddressMethod, BridgeConfig, InterfaceConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the last attempt to bring a persisted bridge up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStatus {
    Pending,
    Active,
    Error,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeStatus::Pending => "pending",
            BridgeStatus::Active => "active",
            BridgeStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BridgeStatus::Pending),
            "active" => Some(BridgeStatus::Active),
            "error" => Some(BridgeStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentBridge {
    pub name: String,
    pub config: BridgeConfig,
    pub status: BridgeStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistentBridge {
    pub fn new(name: impl Into<String>, config: BridgeConfig) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            config,
            status: BridgeStatus::Active,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentInterface {
    pub name: String,
    pub config: InterfaceConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistentInterface {
    pub fn new(name: impl Into<String>, config: InterfaceConfig) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            config,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn method(&self) -> AddressMethod {
        self.config.effective_method()
    }
}
