//! Debian `/etc/network/interfaces` model
//!
//! Parsing keeps enough structure to rewrite the file in the ifupdown2
//! layout Proxmox hosts use: loopback first, one stanza per interface with
//! options indented by eight spaces, and an optional `inet6` stanza.

use crate::errors::{NetStageError, Result};
use crate::model::payload::{BridgeConfig, InterfaceConfig};
use std::collections::BTreeMap;

const OPTION_INDENT: &str = "        ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StanzaKind {
    Loopback,
    #[default]
    Physical,
    Bridge,
}

/// One interface's configuration across its `inet` and `inet6` stanzas
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stanza {
    pub name: String,
    pub kind: StanzaKind,
    /// `static`, `dhcp`, `manual` or `loopback`
    pub method: String,
    pub address: Option<String>,
    pub gateway: Option<String>,
    pub ipv6_method: Option<String>,
    pub ipv6_address: Option<String>,
    pub ipv6_gateway: Option<String>,
    pub bridge_ports: Vec<String>,
    pub bridge_stp: Option<String>,
    pub bridge_fd: Option<String>,
    pub bridge_vlan_aware: bool,
    pub mtu: Option<u32>,
    pub auto: bool,
    pub allow_hotplug: bool,
    /// Full comment line, including the leading `#`
    pub comment: Option<String>,
    /// Options this model does not interpret, kept verbatim
    pub extra: Vec<String>,
}

impl Stanza {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            method: "manual".to_string(),
            ..Self::default()
        }
    }
}

/// Parsed interfaces file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfacesFile {
    stanzas: BTreeMap<String, Stanza>,
    /// Top-level directives other than `auto`, `allow-hotplug`, `iface`
    /// and the standard `source` line
    directives: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Family {
    Inet,
    Inet6,
}

impl InterfacesFile {
    /// Parse interfaces file text
    ///
    /// # Errors
    ///
    /// Returns `InterfacesParse` when an `iface` line lacks its family or
    /// method, or an option value cannot be read.
    pub fn parse(text: &str) -> Result<Self> {
        let mut file = Self::default();
        let mut current: Option<(String, Family)> = None;
        let mut pending_comment: Option<String> = None;

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                pending_comment = None;
                continue;
            }
            if trimmed.starts_with('#') {
                pending_comment = Some(trimmed.to_string());
                continue;
            }

            let indented = line.starts_with(char::is_whitespace);
            if indented {
                if let Some((name, family)) = &current {
                    let stanza = file.entry(name);
                    apply_option(stanza, *family, trimmed, line_no)?;
                    continue;
                }
            }
            current = None;

            let mut words = trimmed.split_whitespace();
            match words.next() {
                Some("auto") => {
                    for name in words {
                        file.entry(name).auto = true;
                    }
                    take_comment(&mut file, trimmed, &mut pending_comment);
                }
                Some("allow-hotplug") => {
                    for name in words {
                        file.entry(name).allow_hotplug = true;
                    }
                    take_comment(&mut file, trimmed, &mut pending_comment);
                }
                Some("iface") => {
                    let parts: Vec<&str> = words.collect();
                    let [name, family, method, ..] = parts.as_slice() else {
                        return Err(NetStageError::InterfacesParse {
                            line: line_no,
                            reason: format!("expected `iface <name> <family> <method>`, got `{}`", trimmed),
                        });
                    };
                    let comment = pending_comment.take();
                    let stanza = file.entry(name);
                    if comment.is_some() {
                        stanza.comment = comment;
                    }
                    let family = match *family {
                        "inet" => {
                            stanza.method = method.to_string();
                            if *method == "loopback" {
                                stanza.kind = StanzaKind::Loopback;
                            }
                            Family::Inet
                        }
                        "inet6" => {
                            stanza.ipv6_method = Some(method.to_string());
                            Family::Inet6
                        }
                        other => {
                            return Err(NetStageError::InterfacesParse {
                                line: line_no,
                                reason: format!("unsupported address family `{}`", other),
                            })
                        }
                    };
                    current = Some((name.to_string(), family));
                }
                Some("source") if trimmed == "source /etc/network/interfaces.d/*" => {}
                _ => file.directives.push(trimmed.to_string()),
            }
        }
        Ok(file)
    }

    fn entry(&mut self, name: &str) -> &mut Stanza {
        self.stanzas
            .entry(name.to_string())
            .or_insert_with(|| Stanza::named(name))
    }

    pub fn get(&self, name: &str) -> Option<&Stanza> {
        self.stanzas.get(name)
    }

    pub fn stanzas(&self) -> impl Iterator<Item = &Stanza> {
        self.stanzas.values()
    }

    /// Add or replace a bridge stanza and mark its ports as manual members
    pub fn add_bridge(&mut self, name: &str, cfg: &BridgeConfig) {
        let comment = cfg
            .description
            .as_deref()
            .map(|d| format!("# {}", d))
            .unwrap_or_else(|| format!("# Bridge {}", name));
        let bridge = Stanza {
            name: name.to_string(),
            kind: StanzaKind::Bridge,
            method: if cfg.ip_address.is_some() { "static" } else { "manual" }.to_string(),
            address: cfg.ip_address.clone(),
            gateway: cfg.gateway.clone(),
            ipv6_method: cfg.ipv6_address.as_ref().map(|_| "static".to_string()),
            ipv6_address: cfg.ipv6_address.clone(),
            ipv6_gateway: cfg.ipv6_gateway.clone(),
            bridge_ports: cfg.ports.clone(),
            bridge_stp: Some("off".to_string()),
            bridge_fd: Some("0".to_string()),
            bridge_vlan_aware: cfg.vlan_aware,
            mtu: None,
            auto: cfg.autostart,
            allow_hotplug: false,
            comment: Some(comment),
            extra: Vec::new(),
        };
        self.stanzas.insert(name.to_string(), bridge);

        // Ports carry no addresses of their own once enslaved
        for port in &cfg.ports {
            let mut stanza = Stanza::named(port);
            stanza.auto = true;
            stanza.comment = Some(format!("# Port for bridge {}", name));
            self.stanzas.insert(port.clone(), stanza);
        }
    }

    /// Remove a bridge stanza, returning its ports to DHCP
    pub fn remove_bridge(&mut self, name: &str) -> bool {
        let Some(bridge) = self.stanzas.remove(name) else {
            return false;
        };
        for port in bridge.bridge_ports {
            let mut stanza = Stanza::named(&port);
            stanza.method = "dhcp".to_string();
            stanza.allow_hotplug = true;
            self.stanzas.insert(port, stanza);
        }
        true
    }

    /// Add or replace an interface stanza, keeping options it does not set
    pub fn upsert_interface(&mut self, name: &str, cfg: &InterfaceConfig) {
        let stanza = self.entry(name);
        stanza.kind = StanzaKind::Physical;
        stanza.method = cfg.effective_method().as_str().to_string();
        stanza.address = cfg.ip_address.clone();
        stanza.gateway = cfg.gateway.clone();
        stanza.ipv6_method = cfg.ipv6_address.as_ref().map(|_| "static".to_string());
        stanza.ipv6_address = cfg.ipv6_address.clone();
        stanza.ipv6_gateway = cfg.ipv6_gateway.clone();
        stanza.bridge_ports.clear();
        stanza.bridge_stp = None;
        stanza.bridge_fd = None;
        stanza.bridge_vlan_aware = false;
        stanza.mtu = cfg.mtu;
        stanza.auto = cfg.autostart;
        stanza.allow_hotplug = !cfg.autostart;
        if let Some(comment) = &cfg.comment {
            stanza.comment = Some(if comment.starts_with('#') {
                comment.clone()
            } else {
                format!("# {}", comment)
            });
        }
    }

    pub fn remove_interface(&mut self, name: &str) -> bool {
        self.stanzas.remove(name).is_some()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("# This file describes the network interfaces available on your system\n");
        out.push_str("# and how to activate them. For more information, see interfaces(5).\n");
        out.push('\n');
        out.push_str("source /etc/network/interfaces.d/*\n");
        for directive in &self.directives {
            out.push_str(directive);
            out.push('\n');
        }
        out.push('\n');
        out.push_str("# The loopback network interface\n");
        out.push_str("auto lo\n");
        out.push_str("iface lo inet loopback\n");
        out.push('\n');

        for stanza in self.stanzas.values().filter(|s| s.name != "lo") {
            render_stanza(&mut out, stanza);
        }
        out
    }
}

fn take_comment(file: &mut InterfacesFile, line: &str, pending: &mut Option<String>) {
    // A comment directly above `auto X` belongs to X
    if let Some(comment) = pending.take() {
        if let Some(name) = line.split_whitespace().nth(1) {
            file.entry(name).comment = Some(comment);
        }
    }
}

fn apply_option(stanza: &mut Stanza, family: Family, option: &str, line: usize) -> Result<()> {
    let (key, value) = option
        .split_once(char::is_whitespace)
        .map(|(k, v)| (k, v.trim()))
        .unwrap_or((option, ""));

    match (family, key) {
        (Family::Inet, "address") => stanza.address = Some(value.to_string()),
        (Family::Inet, "gateway") => stanza.gateway = Some(value.to_string()),
        (Family::Inet6, "address") => stanza.ipv6_address = Some(value.to_string()),
        (Family::Inet6, "gateway") => stanza.ipv6_gateway = Some(value.to_string()),
        (_, "bridge-ports" | "bridge_ports") => {
            stanza.kind = StanzaKind::Bridge;
            stanza.bridge_ports = value
                .split_whitespace()
                .filter(|p| *p != "none")
                .map(str::to_string)
                .collect();
        }
        (_, "bridge-stp" | "bridge_stp") => stanza.bridge_stp = Some(value.to_string()),
        (_, "bridge-fd" | "bridge_fd") => stanza.bridge_fd = Some(value.to_string()),
        (_, "bridge-vlan-aware") => stanza.bridge_vlan_aware = value == "yes",
        (_, "mtu") => {
            stanza.mtu = Some(value.parse().map_err(|_| NetStageError::InterfacesParse {
                line,
                reason: format!("mtu `{}` is not a number", value),
            })?)
        }
        _ => stanza.extra.push(option.to_string()),
    }
    Ok(())
}

fn render_stanza(out: &mut String, stanza: &Stanza) {
    if let Some(comment) = &stanza.comment {
        out.push_str(comment);
        out.push('\n');
    }
    if stanza.auto {
        out.push_str(&format!("auto {}\n", stanza.name));
    } else if stanza.allow_hotplug {
        out.push_str(&format!("allow-hotplug {}\n", stanza.name));
    }
    out.push_str(&format!("iface {} inet {}\n", stanza.name, stanza.method));

    let mut options: Vec<(String, String)> = Vec::new();
    if let Some(address) = &stanza.address {
        options.push(("address".into(), address.clone()));
    }
    if let Some(gateway) = &stanza.gateway {
        options.push(("gateway".into(), gateway.clone()));
    }
    if stanza.kind == StanzaKind::Bridge {
        let ports = if stanza.bridge_ports.is_empty() {
            "none".to_string()
        } else {
            stanza.bridge_ports.join(" ")
        };
        options.push(("bridge-ports".into(), ports));
    }
    if let Some(stp) = &stanza.bridge_stp {
        options.push(("bridge-stp".into(), stp.clone()));
    }
    if let Some(fd) = &stanza.bridge_fd {
        options.push(("bridge-fd".into(), fd.clone()));
    }
    if stanza.bridge_vlan_aware {
        options.push(("bridge-vlan-aware".into(), "yes".into()));
    }
    if let Some(mtu) = stanza.mtu {
        options.push(("mtu".into(), mtu.to_string()));
    }
    for (key, value) in &options {
        out.push_str(&format!("{}{} {}\n", OPTION_INDENT, key, value));
    }
    for extra in &stanza.extra {
        out.push_str(&format!("{}{}\n", OPTION_INDENT, extra));
    }
    out.push('\n');

    if stanza.ipv6_method.is_some() || stanza.ipv6_address.is_some() {
        let method = stanza.ipv6_method.as_deref().unwrap_or("static");
        out.push_str(&format!("iface {} inet6 {}\n", stanza.name, method));
        if let Some(address) = &stanza.ipv6_address {
            out.push_str(&format!("{}address {}\n", OPTION_INDENT, address));
        }
        if let Some(gateway) = &stanza.ipv6_gateway {
            out.push_str(&format!("{}gateway {}\n", OPTION_INDENT, gateway));
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROXMOX: &str = "\
# This file describes the network interfaces available on your system
# and how to activate them. For more information, see interfaces(5).

source /etc/network/interfaces.d/*

# The loopback network interface
auto lo
iface lo inet loopback

auto eth0
iface eth0 inet static
        address 10.0.0.5/24
        gateway 10.0.0.1
        mtu 9000
        post-up ethtool -K eth0 tso off

# Bridge vmbr1
auto vmbr1
iface vmbr1 inet manual
        bridge-ports none
        bridge-stp off
        bridge-fd 0
        bridge-vlan-aware yes

iface vmbr1 inet6 static
        address fd00::1/64
";

    #[test]
    fn test_parse_proxmox_layout() {
        let file = InterfacesFile::parse(PROXMOX).unwrap();

        let eth0 = file.get("eth0").unwrap();
        assert_eq!(eth0.method, "static");
        assert_eq!(eth0.address.as_deref(), Some("10.0.0.5/24"));
        assert_eq!(eth0.gateway.as_deref(), Some("10.0.0.1"));
        assert_eq!(eth0.mtu, Some(9000));
        assert_eq!(eth0.extra, vec!["post-up ethtool -K eth0 tso off"]);
        assert!(eth0.auto);
        assert_eq!(eth0.comment, None);

        let bridge = file.get("vmbr1").unwrap();
        assert_eq!(bridge.kind, StanzaKind::Bridge);
        assert!(bridge.bridge_ports.is_empty());
        assert!(bridge.bridge_vlan_aware);
        assert_eq!(bridge.comment.as_deref(), Some("# Bridge vmbr1"));
        assert_eq!(bridge.ipv6_method.as_deref(), Some("static"));
        assert_eq!(bridge.ipv6_address.as_deref(), Some("fd00::1/64"));

        assert_eq!(file.get("lo").unwrap().kind, StanzaKind::Loopback);
    }

    #[test]
    fn test_render_is_stable_under_reparse() {
        let file = InterfacesFile::parse(PROXMOX).unwrap();
        let rendered = file.render();
        let reparsed = InterfacesFile::parse(&rendered).unwrap();

        assert_eq!(reparsed, file);
        assert_eq!(reparsed.render(), rendered);
    }

    #[test]
    fn test_add_bridge_rewrites_ports_as_manual() {
        let mut file = InterfacesFile::parse(PROXMOX).unwrap();
        file.add_bridge(
            "br0",
            &BridgeConfig {
                ports: vec!["eth0".into()],
                ip_address: Some("192.168.50.1/24".into()),
                ..BridgeConfig::default()
            },
        );

        let rendered = file.render();
        assert!(rendered.contains(
            "# Bridge br0\nauto br0\niface br0 inet static\n        address 192.168.50.1/24\n        bridge-ports eth0\n        bridge-stp off\n        bridge-fd 0\n"
        ));
        assert!(rendered.contains("# Port for bridge br0\nauto eth0\niface eth0 inet manual\n"));
        assert!(!rendered.contains("address 10.0.0.5/24"));
    }

    #[test]
    fn test_remove_bridge_returns_ports_to_dhcp() {
        let mut file = InterfacesFile::default();
        file.add_bridge(
            "br0",
            &BridgeConfig {
                ports: vec!["eth1".into()],
                ..BridgeConfig::default()
            },
        );
        assert!(file.remove_bridge("br0"));
        assert!(!file.remove_bridge("br0"));

        let eth1 = file.get("eth1").unwrap();
        assert_eq!(eth1.method, "dhcp");
        assert!(eth1.allow_hotplug);
        assert!(file.render().contains("allow-hotplug eth1\niface eth1 inet dhcp\n"));
    }

    #[test]
    fn test_upsert_interface_keeps_unknown_options() {
        let mut file = InterfacesFile::parse(PROXMOX).unwrap();
        file.upsert_interface(
            "eth0",
            &InterfaceConfig {
                ip_address: Some("10.0.0.9/24".into()),
                comment: Some("uplink".into()),
                ..InterfaceConfig::default()
            },
        );
        let eth0 = file.get("eth0").unwrap();
        assert_eq!(eth0.address.as_deref(), Some("10.0.0.9/24"));
        assert_eq!(eth0.gateway, None);
        assert_eq!(eth0.mtu, None);
        assert_eq!(eth0.comment.as_deref(), Some("# uplink"));
        assert_eq!(eth0.extra.len(), 1);
    }

    #[test]
    fn test_malformed_iface_line_is_rejected() {
        let err = InterfacesFile::parse("auto eth0\niface eth0 inet\n").unwrap_err();
        assert!(matches!(err, NetStageError::InterfacesParse { line: 2, .. }));
    }

    proptest::proptest! {
        #[test]
        fn prop_bridge_edits_survive_reparse(
            bridges in proptest::collection::vec(
                (0u8..6, proptest::collection::vec(1u8..5, 0..3), proptest::option::of(1u8..250), proptest::bool::ANY),
                1..5,
            ),
            removed in proptest::option::of(0u8..6),
        ) {
            let mut file = InterfacesFile::parse(PROXMOX).unwrap();
            for (idx, ports, octet, vlan_aware) in &bridges {
                file.add_bridge(
                    &format!("br{}", idx),
                    &BridgeConfig {
                        ports: ports.iter().map(|p| format!("eth{}", p)).collect(),
                        ip_address: octet.map(|o| format!("10.{}.0.1/24", o)),
                        vlan_aware: *vlan_aware,
                        ..BridgeConfig::default()
                    },
                );
            }
            if let Some(idx) = removed {
                file.remove_bridge(&format!("br{}", idx));
            }

            let rendered = file.render();
            let reparsed = InterfacesFile::parse(&rendered).unwrap();
            proptest::prop_assert_eq!(&reparsed, &file);
            proptest::prop_assert_eq!(reparsed.render(), rendered);
        }
    }
}
