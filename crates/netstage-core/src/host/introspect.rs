//! Parsers for iproute2 output and the live queries built on them

use crate::errors::{NetStageError, Result};
use crate::host::{commands, run_checked, CommandRunner};
use std::collections::BTreeMap;

/// One line of `ip -o link show`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
    /// Administratively up
    pub up: bool,
    pub mtu: u32,
    pub master: Option<String>,
    pub mac_address: Option<String>,
    pub bridge: bool,
}

/// Parse one `ip -o link show` line
///
/// `2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc ... master br0 state UP ...\    link/ether 52:54:00:12:34:56 brd ff:ff:ff:ff:ff:ff`
pub fn parse_link_line(line: &str) -> Option<LinkInfo> {
    let (index, rest) = line.split_once(": ")?;
    let index = index.trim().parse().ok()?;
    let (name, rest) = rest.split_once(": ")?;
    // VLAN and veth links print as `name@parent`
    let name = name.split('@').next()?.trim().to_string();

    let flags = rest
        .strip_prefix('<')
        .and_then(|r| r.split_once('>'))
        .map(|(f, _)| f)
        .unwrap_or_default();
    let up = flags.split(',').any(|f| f == "UP");

    let words: Vec<&str> = rest.split_whitespace().collect();
    let after = |key: &str| {
        words
            .iter()
            .position(|w| *w == key)
            .and_then(|i| words.get(i + 1))
            .map(|w| w.to_string())
    };

    Some(LinkInfo {
        index,
        name,
        up,
        mtu: after("mtu").and_then(|m| m.parse().ok()).unwrap_or(0),
        master: after("master"),
        mac_address: after("link/ether"),
        bridge: false,
    })
}

pub fn parse_links(text: &str) -> Vec<LinkInfo> {
    text.lines().filter_map(parse_link_line).collect()
}

/// Group `ip -o addr show` output by interface
///
/// IPv6 link-local addresses are skipped; the kernel regenerates them.
pub fn parse_addresses(text: &str) -> BTreeMap<String, Vec<String>> {
    let mut by_link: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        let (Some(name), Some(family), Some(cidr)) = (words.get(1), words.get(2), words.get(3))
        else {
            continue;
        };
        if !matches!(*family, "inet" | "inet6") || cidr.starts_with("fe80") {
            continue;
        }
        let name = name.split('@').next().unwrap_or(*name).to_string();
        by_link.entry(name).or_default().push(cidr.to_string());
    }
    by_link
}

/// Route line reduced to the fields used for matching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: String,
    pub via: Option<String>,
    pub dev: Option<String>,
}

pub fn parse_route_line(line: &str) -> Option<RouteEntry> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let destination = words.first()?.to_string();
    let after = |key: &str| {
        words
            .iter()
            .position(|w| *w == key)
            .and_then(|i| words.get(i + 1))
            .map(|w| w.to_string())
    };
    Some(RouteEntry {
        destination,
        via: after("via"),
        dev: after("dev"),
    })
}

/// Links keyed by name, with bridges flagged
///
/// # Errors
///
/// Fails when either `ip link` query fails.
pub fn link_table(runner: &dyn CommandRunner) -> Result<BTreeMap<String, LinkInfo>> {
    let all = run_checked(runner, &commands::link_show_all())?;
    let bridges = run_checked(runner, &commands::link_show_bridges())?;
    let bridge_names: Vec<String> = parse_links(&bridges).into_iter().map(|l| l.name).collect();

    Ok(parse_links(&all)
        .into_iter()
        .map(|mut link| {
            link.bridge = bridge_names.contains(&link.name);
            (link.name.clone(), link)
        })
        .collect())
}

/// Global addresses configured on one link, in kernel order
///
/// # Errors
///
/// Fails when the link does not exist or the query fails.
pub fn interface_addresses(runner: &dyn CommandRunner, dev: &str) -> Result<Vec<String>> {
    let text = run_checked(runner, &commands::addr_show_dev(dev))?;
    Ok(parse_addresses(&text).remove(dev).unwrap_or_default())
}

/// Gateway of the default route through `dev`, if any
///
/// # Errors
///
/// Fails when the route query fails.
pub fn default_gateway(runner: &dyn CommandRunner, dev: &str) -> Result<Option<String>> {
    let text = run_checked(runner, &commands::default_route_show_dev(dev))?;
    // With `dev` filtered, iproute2 omits the dev column: `default via 10.0.0.1 proto static`
    Ok(text
        .lines()
        .find_map(|l| {
            let mut words = l.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("default"), Some("via"), Some(gw)) => Some(gw.to_string()),
                _ => None,
            }
        }))
}

/// Current routes, one entry per `ip route show` line
///
/// # Errors
///
/// Fails when the route query fails.
pub fn routes(runner: &dyn CommandRunner) -> Result<Vec<RouteEntry>> {
    let text = run_checked(runner, &commands::route_show())?;
    Ok(text.lines().filter_map(parse_route_line).collect())
}

/// Require a link to exist, returning its info
///
/// # Errors
///
/// Returns `LinkNotFound` when the link is absent.
pub fn require_link(links: &BTreeMap<String, LinkInfo>, name: &str) -> Result<LinkInfo> {
    links
        .get(name)
        .cloned()
        .ok_or_else(|| NetStageError::LinkNotFound {
            name: name.to_string(),
        })
}
