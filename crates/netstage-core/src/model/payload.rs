//! Typed configuration payloads carried by pending changes
//!
//! The ledger stores a payload as the bare JSON object for its variant; the
//! change type column says which variant it is. `ChangeConfig::from_json`
//! reverses that.

use crate::errors::{NetStageError, Result};
use crate::model::change::{ChangeAction, ChangeType};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Proposed or observed configuration of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeConfig {
    Bridge(BridgeConfig),
    Interface(InterfaceConfig),
    Route(RouteConfig),
    Firewall(FirewallRule),
    Dns(DnsConfig),
}

impl ChangeConfig {
    pub fn change_type(&self) -> ChangeType {
        match self {
            ChangeConfig::Bridge(_) => ChangeType::Bridge,
            ChangeConfig::Interface(_) => ChangeType::Interface,
            ChangeConfig::Route(_) => ChangeType::Route,
            ChangeConfig::Firewall(_) => ChangeType::Firewall,
            ChangeConfig::Dns(_) => ChangeType::Dns,
        }
    }

    /// Decode a payload whose variant is given by `change_type`
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when the JSON does not fit the variant.
    pub fn from_json(change_type: ChangeType, json: &str) -> Result<Self> {
        Ok(match change_type {
            ChangeType::Bridge => ChangeConfig::Bridge(serde_json::from_str(json)?),
            ChangeType::Interface => ChangeConfig::Interface(serde_json::from_str(json)?),
            ChangeType::Route => ChangeConfig::Route(serde_json::from_str(json)?),
            ChangeType::Firewall => ChangeConfig::Firewall(serde_json::from_str(json)?),
            ChangeType::Dns => ChangeConfig::Dns(serde_json::from_str(json)?),
        })
    }

    /// Encode the variant's fields as a JSON object
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check the payload is usable for the given action
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` or `InvalidAddress` describing the first
    /// problem found.
    pub fn validate(&self, action: ChangeAction) -> Result<()> {
        match self {
            // Deletes of named resources only need the resource id
            ChangeConfig::Bridge(_) | ChangeConfig::Interface(_)
                if action == ChangeAction::Delete =>
            {
                Ok(())
            }
            ChangeConfig::Bridge(cfg) => cfg.validate(),
            ChangeConfig::Interface(cfg) => cfg.validate(),
            ChangeConfig::Route(cfg) => cfg.validate(action),
            ChangeConfig::Firewall(rule) => rule.validate(),
            ChangeConfig::Dns(cfg) => cfg.validate(),
        }
    }
}

/// Linux bridge definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Member ports, attached after the bridge is up and addressed
    pub ports: Vec<String>,
    /// IPv4 address in CIDR form
    pub ip_address: Option<String>,
    /// IPv6 address in CIDR form
    pub ipv6_address: Option<String>,
    pub gateway: Option<String>,
    pub ipv6_gateway: Option<String>,
    pub vlan_aware: bool,
    /// Bring the bridge up at boot
    pub autostart: bool,
    pub description: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ports: Vec::new(),
            ip_address: None,
            ipv6_address: None,
            gateway: None,
            ipv6_gateway: None,
            vlan_aware: false,
            autostart: true,
            description: None,
        }
    }
}

impl BridgeConfig {
    /// Addresses to configure, IPv4 first
    pub fn addresses(&self) -> Vec<&str> {
        self.ip_address
            .iter()
            .chain(self.ipv6_address.iter())
            .map(String::as_str)
            .collect()
    }

    fn validate(&self) -> Result<()> {
        for port in &self.ports {
            validate_link_name(ChangeType::Bridge, port)?;
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.ports.iter().find(|p| !seen.insert(p.as_str())) {
            return Err(NetStageError::InvalidConfig {
                change_type: ChangeType::Bridge,
                reason: format!("port {} listed more than once", dup),
            });
        }
        validate_optional_cidr(self.ip_address.as_deref())?;
        validate_optional_cidr(self.ipv6_address.as_deref())?;
        validate_optional_ip(self.gateway.as_deref())?;
        validate_optional_ip(self.ipv6_gateway.as_deref())?;
        if self.gateway.is_some() && self.ip_address.is_none() {
            return Err(NetStageError::InvalidConfig {
                change_type: ChangeType::Bridge,
                reason: "gateway requires ip_address".to_string(),
            });
        }
        Ok(())
    }
}

/// How an interface obtains its address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMethod {
    Static,
    Dhcp,
    Manual,
}

impl AddressMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressMethod::Static => "static",
            AddressMethod::Dhcp => "dhcp",
            AddressMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "static" => Some(AddressMethod::Static),
            "dhcp" => Some(AddressMethod::Dhcp),
            "manual" => Some(AddressMethod::Manual),
            _ => None,
        }
    }
}

/// Physical or virtual interface definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Explicit method; derived from `ip_address` when absent
    pub method: Option<AddressMethod>,
    pub ip_address: Option<String>,
    pub ipv6_address: Option<String>,
    pub gateway: Option<String>,
    pub ipv6_gateway: Option<String>,
    pub mtu: Option<u32>,
    pub autostart: bool,
    pub comment: Option<String>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            method: None,
            ip_address: None,
            ipv6_address: None,
            gateway: None,
            ipv6_gateway: None,
            mtu: None,
            autostart: true,
            comment: None,
        }
    }
}

impl InterfaceConfig {
    /// Static when an address is given, DHCP otherwise
    pub fn effective_method(&self) -> AddressMethod {
        self.method.unwrap_or(if self.ip_address.is_some() {
            AddressMethod::Static
        } else {
            AddressMethod::Dhcp
        })
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.ip_address
            .iter()
            .chain(self.ipv6_address.iter())
            .map(String::as_str)
            .collect()
    }

    fn validate(&self) -> Result<()> {
        validate_optional_cidr(self.ip_address.as_deref())?;
        validate_optional_cidr(self.ipv6_address.as_deref())?;
        validate_optional_ip(self.gateway.as_deref())?;
        validate_optional_ip(self.ipv6_gateway.as_deref())?;
        if self.effective_method() == AddressMethod::Static && self.ip_address.is_none() {
            return Err(NetStageError::InvalidConfig {
                change_type: ChangeType::Interface,
                reason: "static method requires ip_address".to_string(),
            });
        }
        if let Some(mtu) = self.mtu {
            if !(68..=65535).contains(&mtu) {
                return Err(NetStageError::InvalidConfig {
                    change_type: ChangeType::Interface,
                    reason: format!("mtu {} outside 68..=65535", mtu),
                });
            }
        }
        Ok(())
    }
}

/// Static route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// CIDR destination or `default`
    pub destination: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub interface: String,
}

impl RouteConfig {
    fn validate(&self, action: ChangeAction) -> Result<()> {
        if self.destination != "default" {
            validate_ip_or_cidr(&self.destination)?;
        }
        if action == ChangeAction::Delete {
            return Ok(());
        }
        validate_ip_or_cidr(&self.gateway)?;
        validate_link_name(ChangeType::Route, &self.interface)
    }
}

/// INPUT-chain firewall rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    /// Jump target: ACCEPT, DROP, REJECT or LOG
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, alias = "to", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

const FIREWALL_TARGETS: [&str; 4] = ["ACCEPT", "DROP", "REJECT", "LOG"];

impl FirewallRule {
    /// Rule match and target arguments, without the chain operation
    pub fn match_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(proto) = non_empty(self.protocol.as_deref()) {
            args.push("-p".to_string());
            args.push(proto.to_string());
        }
        if let Some(src) = non_empty(self.source.as_deref()) {
            args.push("-s".to_string());
            args.push(src.to_string());
        }
        if let Some(dst) = non_empty(self.destination.as_deref()) {
            args.push("-d".to_string());
            args.push(dst.to_string());
        }
        args.push("-j".to_string());
        args.push(self.action.to_ascii_uppercase());
        args
    }

    fn validate(&self) -> Result<()> {
        let target = self.action.to_ascii_uppercase();
        if !FIREWALL_TARGETS.contains(&target.as_str()) {
            return Err(NetStageError::InvalidConfig {
                change_type: ChangeType::Firewall,
                reason: format!(
                    "action '{}' is not one of {}",
                    self.action,
                    FIREWALL_TARGETS.join(", ")
                ),
            });
        }
        if let Some(proto) = non_empty(self.protocol.as_deref()) {
            if !proto.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(NetStageError::InvalidConfig {
                    change_type: ChangeType::Firewall,
                    reason: format!("protocol '{}' is malformed", proto),
                });
            }
        }
        if let Some(src) = non_empty(self.source.as_deref()) {
            validate_ip_or_cidr(src)?;
        }
        if let Some(dst) = non_empty(self.destination.as_deref()) {
            validate_ip_or_cidr(dst)?;
        }
        Ok(())
    }
}

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub nameservers: Vec<String>,
    pub search_domains: Vec<String>,
}

impl DnsConfig {
    fn validate(&self) -> Result<()> {
        if self.nameservers.is_empty() {
            return Err(NetStageError::InvalidConfig {
                change_type: ChangeType::Dns,
                reason: "at least one nameserver is required".to_string(),
            });
        }
        for ns in &self.nameservers {
            parse_ip(ns)?;
        }
        if let Some(bad) = self
            .search_domains
            .iter()
            .find(|d| d.is_empty() || d.chars().any(char::is_whitespace))
        {
            return Err(NetStageError::InvalidConfig {
                change_type: ChangeType::Dns,
                reason: format!("search domain '{}' is malformed", bad),
            });
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn validate_link_name(change_type: ChangeType, name: &str) -> Result<()> {
    // IFNAMSIZ minus the terminating NUL
    if name.is_empty() || name.len() > 15 || name.contains('/') || name.contains(char::is_whitespace)
    {
        return Err(NetStageError::InvalidConfig {
            change_type,
            reason: format!("'{}' is not a valid interface name", name),
        });
    }
    Ok(())
}

fn parse_ip(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .map_err(|e| NetStageError::InvalidAddress {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse `addr/prefix`, checking the prefix fits the address family
///
/// # Errors
///
/// Returns `InvalidAddress` when either half is malformed.
pub fn parse_cidr(value: &str) -> Result<(IpAddr, u8)> {
    let invalid = |reason: &str| NetStageError::InvalidAddress {
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let (addr, prefix) = value
        .split_once('/')
        .ok_or_else(|| invalid("expected address/prefix"))?;
    let addr = parse_ip(addr)?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid("prefix is not a number"))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid("prefix too long for address family"));
    }
    Ok((addr, prefix))
}

/// Whether `addr` lies inside the subnet of `cidr`
pub fn cidr_contains(cidr: &str, addr: &str) -> bool {
    let (Ok((net, prefix)), Ok(addr)) = (parse_cidr(cidr), addr.parse::<IpAddr>()) else {
        return false;
    };
    match (net, addr) {
        (IpAddr::V4(n), IpAddr::V4(a)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            u32::from(n) & mask == u32::from(a) & mask
        }
        (IpAddr::V6(n), IpAddr::V6(a)) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            u128::from(n) & mask == u128::from(a) & mask
        }
        _ => false,
    }
}

fn validate_ip_or_cidr(value: &str) -> Result<()> {
    if value.contains('/') {
        parse_cidr(value).map(|_| ())
    } else {
        parse_ip(value).map(|_| ())
    }
}

fn validate_optional_cidr(value: Option<&str>) -> Result<()> {
    value.map_or(Ok(()), |v| parse_cidr(v).map(|_| ()))
}

fn validate_optional_ip(value: Option<&str>) -> Result<()> {
    value.map_or(Ok(()), |v| parse_ip(v).map(|_| ()))
}
