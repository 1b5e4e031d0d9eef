//! Network snapshot model
//!
//! A snapshot records everything rollback needs to put the host back the
//! way it was before an apply started.

use crate::errors::{NetStageError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a snapshot
///
/// `Active` means an apply is in flight, or was interrupted. `Applied` and
/// `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Active,
    Applied,
    RolledBack,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Active => "active",
            SnapshotStatus::Applied => "applied",
            SnapshotStatus::RolledBack => "rolled_back",
        }
    }
}

impl FromStr for SnapshotStatus {
    type Err = NetStageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SnapshotStatus::Active),
            "applied" => Ok(SnapshotStatus::Applied),
            "rolled_back" => Ok(SnapshotStatus::RolledBack),
            other => Err(NetStageError::UnknownSnapshotStatus {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live state of one link
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterfaceState {
    pub up: bool,
    /// CIDR addresses, sorted, link-local excluded
    pub addresses: Vec<String>,
    pub mtu: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<String>,
    #[serde(default)]
    pub bridge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Raw `ip route show dev <name>` output
    #[serde(default)]
    pub routes: String,
}

/// Host network state as probed at one instant
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkState {
    pub interface_states: BTreeMap<String, InterfaceState>,
    /// Raw `ip route show` output
    pub route_table: String,
    /// Raw `iptables -L -n -v` output, kept for operators
    pub firewall_rules: String,
    /// Raw `iptables -S INPUT` output, used by rollback
    pub firewall_rule_specs: String,
    /// Interfaces file content, `None` when the file was absent
    pub interfaces_file: Option<String>,
    /// Resolver file content, `None` when the file was absent
    pub resolv_conf: Option<String>,
}

impl NetworkState {
    /// Non-empty lines of the route table
    pub fn route_lines(&self) -> Vec<String> {
        route_lines(&self.route_table)
    }

    /// `-A INPUT ...` lines of the firewall rule specs
    pub fn input_rule_specs(&self) -> Vec<String> {
        input_rule_specs(&self.firewall_rule_specs)
    }
}

/// Split `ip route show` output into trimmed, non-empty lines
pub fn route_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract appended rules from `iptables -S` output, ignoring policy lines
pub fn input_rule_specs(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.starts_with("-A "))
        .map(str::to_string)
        .collect()
}

/// Persisted snapshot of host state taken before an apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub state: NetworkState,
    pub status: SnapshotStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl NetworkSnapshot {
    /// Wrap a freshly probed state as a new active snapshot
    pub fn new(state: NetworkState) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            state,
            status: SnapshotStatus::Active,
            applied_at: None,
            rolled_back_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(SnapshotStatus::RolledBack.as_str(), "rolled_back");
        assert_eq!(
            "rolled_back".parse::<SnapshotStatus>().unwrap(),
            SnapshotStatus::RolledBack
        );
        assert!("done".parse::<SnapshotStatus>().is_err());
    }

    #[test]
    fn test_input_rule_specs_skip_policy() {
        let text = "-P INPUT ACCEPT\n-A INPUT -p tcp -j ACCEPT\n\n-A INPUT -s 10.0.0.0/8 -j DROP\n";
        assert_eq!(
            input_rule_specs(text),
            vec!["-A INPUT -p tcp -j ACCEPT", "-A INPUT -s 10.0.0.0/8 -j DROP"]
        );
    }

    #[test]
    fn test_new_snapshot_is_active() {
        let snap = NetworkSnapshot::new(NetworkState::default());
        assert_eq!(snap.status, SnapshotStatus::Active);
        assert!(snap.applied_at.is_none());
        assert!(!snap.id.is_empty());
    }

    #[test]
    fn test_state_json_round_trip_keeps_interfaces() {
        let mut state = NetworkState::default();
        state.interface_states.insert(
            "eth0".into(),
            InterfaceState {
                up: true,
                addresses: vec!["10.0.0.5/24".into()],
                mtu: 1500,
                ..InterfaceState::default()
            },
        );
        let json = serde_json::to_string(&state).unwrap();
        let back: NetworkState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
