//! In-memory model of a host's network stack
//!
//! `SimulatedHost` answers the same iproute2/iptables invocations the change
//! manager issues, printing output in the same shape the real tools do. It
//! records a transcript of every command and can be told to fail commands
//! by prefix, which is how transaction and rollback behaviour is exercised
//! without root.

use crate::errors::Result;
use crate::host::introspect::parse_route_line;
use crate::host::{CommandOutput, CommandRunner, HostCommand};
use crate::model::payload::parse_cidr;
use crate::model::snapshot::{input_rule_specs, route_lines};
use crate::model::NetworkState;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// One simulated link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimLink {
    pub name: String,
    pub index: u32,
    pub bridge: bool,
    pub up: bool,
    pub mtu: u32,
    pub master: Option<String>,
    pub addresses: Vec<String>,
}

#[derive(Debug, Default)]
struct SimState {
    links: BTreeMap<String, SimLink>,
    routes: Vec<String>,
    input_rules: Vec<String>,
    next_index: u32,
}

#[derive(Debug)]
struct Fault {
    prefix: String,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
pub struct SimulatedHost {
    state: RefCell<SimState>,
    transcript: RefCell<Vec<HostCommand>>,
    faults: RefCell<Vec<Fault>>,
}

const FILE_EXISTS: &str = "RTNETLINK answers: File exists";
const NO_SUCH_PROCESS: &str = "RTNETLINK answers: No such process";

fn no_device(name: &str) -> CommandOutput {
    CommandOutput::failed(1, format!("Device \"{}\" does not exist.", name))
}

impl SimulatedHost {
    /// A host with only the loopback link
    pub fn new() -> Self {
        let host = Self::default();
        {
            let mut state = host.state.borrow_mut();
            state.next_index = 1;
            let lo = state.new_link("lo", false);
            state.links.insert(
                "lo".to_string(),
                SimLink {
                    up: true,
                    mtu: 65536,
                    addresses: vec!["127.0.0.1/8".to_string()],
                    ..lo
                },
            );
        }
        host
    }

    /// Add an up physical link carrying `addresses`, with their connected routes
    pub fn with_link(self, name: &str, addresses: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let mut link = state.new_link(name, false);
            link.up = true;
            state.links.insert(name.to_string(), link);
            for addr in addresses {
                state.add_address(name, addr);
            }
        }
        self
    }

    pub fn with_route(self, line: &str) -> Self {
        self.state.borrow_mut().routes.push(line.trim().to_string());
        self
    }

    /// Add an INPUT rule given in `iptables -S` form
    pub fn with_input_rule(self, spec: &str) -> Self {
        self.state.borrow_mut().input_rules.push(canonical_spec(spec));
        self
    }

    /// Seed a host from probed state, so changes can be rehearsed against it
    pub fn from_state(probed: &NetworkState) -> Self {
        let host = Self::default();
        {
            let mut state = host.state.borrow_mut();
            state.next_index = 1;
            for (name, iface) in &probed.interface_states {
                let link = state.new_link(name, iface.bridge);
                state.links.insert(
                    name.clone(),
                    SimLink {
                        up: iface.up,
                        mtu: iface.mtu,
                        master: iface.master.clone(),
                        addresses: iface.addresses.clone(),
                        ..link
                    },
                );
            }
            state.routes = route_lines(&probed.route_table);
            state.input_rules = input_rule_specs(&probed.firewall_rule_specs)
                .iter()
                .map(|spec| canonical_spec(spec))
                .collect();
        }
        host
    }

    /// Fail every command whose rendered form starts with `prefix`
    pub fn fail_on(&self, prefix: &str) {
        self.faults.borrow_mut().push(Fault {
            prefix: prefix.to_string(),
            remaining: None,
        });
    }

    /// Fail only the next command starting with `prefix`
    pub fn fail_once(&self, prefix: &str) {
        self.faults.borrow_mut().push(Fault {
            prefix: prefix.to_string(),
            remaining: Some(1),
        });
    }

    pub fn clear_faults(&self) {
        self.faults.borrow_mut().clear();
    }

    pub fn transcript(&self) -> Vec<HostCommand> {
        self.transcript.borrow().clone()
    }

    pub fn transcript_len(&self) -> usize {
        self.transcript.borrow().len()
    }

    /// Mutating commands issued so far
    pub fn mutations(&self) -> Vec<HostCommand> {
        self.mutations_since(0)
    }

    pub fn mutations_since(&self, start: usize) -> Vec<HostCommand> {
        self.transcript
            .borrow()
            .iter()
            .skip(start)
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn link(&self, name: &str) -> Option<SimLink> {
        self.state.borrow().links.get(name).cloned()
    }

    pub fn routes(&self) -> Vec<String> {
        self.state.borrow().sorted_routes()
    }

    pub fn input_rules(&self) -> Vec<String> {
        self.state.borrow().input_rules.clone()
    }

    fn take_fault(&self, rendered: &str) -> bool {
        let mut faults = self.faults.borrow_mut();
        let Some(pos) = faults.iter().position(|f| rendered.starts_with(&f.prefix)) else {
            return false;
        };
        if let Some(remaining) = faults[pos].remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                faults.remove(pos);
            }
        }
        true
    }
}

impl CommandRunner for SimulatedHost {
    fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        self.transcript.borrow_mut().push(command.clone());

        let rendered = command.to_string();
        if self.take_fault(&rendered) {
            return Ok(CommandOutput::failed(
                2,
                format!("simulated failure: {}", rendered),
            ));
        }

        let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
        let mut state = self.state.borrow_mut();
        Ok(match command.program.as_str() {
            "ip" => state.ip(&args),
            "iptables" => state.iptables(&args),
            "ifreload" | "systemctl" | "dhclient" => CommandOutput::ok(""),
            other => CommandOutput::failed(127, format!("{}: command not found", other)),
        })
    }
}

impl SimState {
    fn new_link(&mut self, name: &str, bridge: bool) -> SimLink {
        let index = self.next_index.max(1);
        self.next_index = index + 1;
        SimLink {
            name: name.to_string(),
            index,
            bridge,
            up: false,
            mtu: 1500,
            master: None,
            addresses: Vec::new(),
        }
    }

    fn ip(&mut self, args: &[&str]) -> CommandOutput {
        let words: Vec<&str> = args.iter().copied().filter(|a| *a != "-o").collect();
        match words.as_slice() {
            ["link"] | ["link", "show"] => CommandOutput::ok(self.render_links(|_| true)),
            ["link", "show", "type", "bridge"] => CommandOutput::ok(self.render_links(|l| l.bridge)),
            ["link", "show", name] => match self.links.contains_key(*name) {
                true => CommandOutput::ok(self.render_links(|l| l.name == *name)),
                false => no_device(name),
            },
            ["link", "add", name, "type", "bridge"] => {
                if self.links.contains_key(*name) {
                    return CommandOutput::failed(2, FILE_EXISTS);
                }
                let link = self.new_link(name, true);
                self.links.insert(name.to_string(), link);
                CommandOutput::ok("")
            }
            ["link", "delete", name, ..] => self.delete_link(name),
            ["link", "set", name, rest @ ..] => self.set_link(name, rest),
            ["addr" | "address", "show"] => CommandOutput::ok(self.render_addresses(None)),
            ["addr" | "address", "show", "dev", name] => match self.links.contains_key(*name) {
                true => CommandOutput::ok(self.render_addresses(Some(name))),
                false => no_device(name),
            },
            ["addr" | "address", "add", cidr, "dev", name] => {
                let Some(link) = self.links.get(*name) else {
                    return no_device(name);
                };
                if link.addresses.iter().any(|a| a == cidr) {
                    return CommandOutput::failed(2, FILE_EXISTS);
                }
                self.add_address(name, cidr);
                CommandOutput::ok("")
            }
            ["addr" | "address", "del", cidr, "dev", name] => {
                let Some(link) = self.links.get_mut(*name) else {
                    return no_device(name);
                };
                let before = link.addresses.len();
                link.addresses.retain(|a| a != cidr);
                if link.addresses.len() == before {
                    return CommandOutput::failed(
                        2,
                        "RTNETLINK answers: Cannot assign requested address",
                    );
                }
                self.drop_routes_for_address(name, cidr);
                CommandOutput::ok("")
            }
            ["addr" | "address", "flush", "dev", name] => {
                let Some(link) = self.links.get_mut(*name) else {
                    return no_device(name);
                };
                let removed = std::mem::take(&mut link.addresses);
                for cidr in &removed {
                    self.drop_routes_for_address(name, cidr);
                }
                CommandOutput::ok("")
            }
            ["route"] | ["route", "show"] => CommandOutput::ok(render_lines(&self.sorted_routes())),
            ["route", "show", "dev", dev] => {
                CommandOutput::ok(self.render_routes_for_dev(dev, |_| true))
            }
            ["route", "show", "default", "dev", dev] => {
                CommandOutput::ok(self.render_routes_for_dev(dev, |r| r.starts_with("default ")))
            }
            ["route", "add", spec @ ..] => self.add_route(spec),
            ["route", "del", spec @ ..] => self.del_route(spec),
            ["route", "replace", spec @ ..] => {
                if let Some(dest) = spec.first() {
                    self.routes
                        .retain(|r| parse_route_line(r).map(|e| e.destination) != Some(dest.to_string()));
                }
                self.add_route(spec)
            }
            _ => CommandOutput::failed(1, format!("Command \"{}\" is unknown", words.join(" "))),
        }
    }

    fn set_link(&mut self, name: &str, rest: &[&str]) -> CommandOutput {
        if !self.links.contains_key(name) {
            return no_device(name);
        }
        match rest {
            ["master", bridge] => {
                if !self.links.get(*bridge).is_some_and(|l| l.bridge) {
                    return CommandOutput::failed(2, format!("Device \"{}\" does not exist.", bridge));
                }
                self.update_link(name, |l| l.master = Some(bridge.to_string()))
            }
            ["nomaster"] => self.update_link(name, |l| l.master = None),
            ["up"] => self.update_link(name, |l| l.up = true),
            ["down"] => self.update_link(name, |l| l.up = false),
            ["mtu", mtu] => match mtu.parse::<u32>() {
                Ok(mtu) => self.update_link(name, |l| l.mtu = mtu),
                Err(_) => CommandOutput::failed(1, format!("Error: argument \"{}\" is wrong", mtu)),
            },
            ["type", "bridge", "vlan_filtering", _] => CommandOutput::ok(""),
            _ => CommandOutput::failed(1, format!("Error: unsupported \"{}\"", rest.join(" "))),
        }
    }

    fn update_link(&mut self, name: &str, f: impl FnOnce(&mut SimLink)) -> CommandOutput {
        if let Some(link) = self.links.get_mut(name) {
            f(link);
        }
        CommandOutput::ok("")
    }

    fn delete_link(&mut self, name: &str) -> CommandOutput {
        if self.links.remove(name).is_none() {
            return CommandOutput::failed(1, format!("Cannot find device \"{}\"", name));
        }
        for link in self.links.values_mut() {
            if link.master.as_deref() == Some(name) {
                link.master = None;
            }
        }
        self.routes
            .retain(|r| parse_route_line(r).and_then(|e| e.dev).as_deref() != Some(name));
        CommandOutput::ok("")
    }

    fn add_address(&mut self, dev: &str, cidr: &str) {
        if let Some(link) = self.links.get_mut(dev) {
            link.addresses.push(cidr.to_string());
        }
        if dev == "lo" {
            return;
        }
        if let Some(route) = connected_route(dev, cidr) {
            if !self.routes.contains(&route) {
                self.routes.push(route);
            }
        }
    }

    /// Remove the connected route of `cidr` and routes whose gateway it made reachable
    fn drop_routes_for_address(&mut self, dev: &str, cidr: &str) {
        let Some((network, prefix)) = ipv4_network(cidr) else {
            return;
        };
        self.routes.retain(|r| {
            let Some(entry) = parse_route_line(r) else {
                return true;
            };
            if entry.dev.as_deref() != Some(dev) {
                return true;
            }
            let connected = entry.destination == format!("{}/{}", network, prefix);
            let via_subnet = entry
                .via
                .as_deref()
                .and_then(|gw| gw.parse::<IpAddr>().ok())
                .is_some_and(|gw| in_network(gw, network, prefix));
            !(connected || via_subnet)
        });
    }

    fn add_route(&mut self, spec: &[&str]) -> CommandOutput {
        let line = spec.join(" ");
        let Some(entry) = parse_route_line(&line) else {
            return CommandOutput::failed(1, "Error: missing route destination");
        };
        if let Some(dev) = entry.dev.as_deref() {
            if !self.links.contains_key(dev) {
                return CommandOutput::failed(1, format!("Cannot find device \"{}\"", dev));
            }
        }
        let exists = self
            .routes
            .iter()
            .filter_map(|r| parse_route_line(r))
            .any(|r| r.destination == entry.destination);
        if exists {
            return CommandOutput::failed(2, FILE_EXISTS);
        }
        self.routes.push(line);
        CommandOutput::ok("")
    }

    fn del_route(&mut self, spec: &[&str]) -> CommandOutput {
        let Some(wanted) = parse_route_line(&spec.join(" ")) else {
            return CommandOutput::failed(1, "Error: missing route destination");
        };
        let pos = self.routes.iter().position(|r| {
            parse_route_line(r).is_some_and(|have| {
                have.destination == wanted.destination
                    && wanted.via.as_ref().map_or(true, |v| have.via.as_ref() == Some(v))
                    && wanted.dev.as_ref().map_or(true, |d| have.dev.as_ref() == Some(d))
            })
        });
        match pos {
            Some(pos) => {
                self.routes.remove(pos);
                CommandOutput::ok("")
            }
            None => CommandOutput::failed(2, NO_SUCH_PROCESS),
        }
    }

    fn sorted_routes(&self) -> Vec<String> {
        let mut routes = self.routes.clone();
        routes.sort_by(|a, b| {
            let a_default = a.starts_with("default");
            let b_default = b.starts_with("default");
            b_default.cmp(&a_default).then_with(|| a.cmp(b))
        });
        routes
    }

    fn render_routes_for_dev(&self, dev: &str, keep: impl Fn(&str) -> bool) -> String {
        let dev_clause = format!(" dev {}", dev);
        let lines: Vec<String> = self
            .sorted_routes()
            .into_iter()
            .filter(|r| parse_route_line(r).and_then(|e| e.dev).as_deref() == Some(dev))
            .filter(|r| keep(r))
            .map(|r| r.replacen(&dev_clause, "", 1))
            .collect();
        render_lines(&lines)
    }

    fn render_links(&self, keep: impl Fn(&SimLink) -> bool) -> String {
        let mut links: Vec<&SimLink> = self.links.values().filter(|l| keep(l)).collect();
        links.sort_by_key(|l| l.index);
        let lines: Vec<String> = links
            .into_iter()
            .map(|l| {
                let (flags, link_kind) = if l.name == "lo" {
                    ("LOOPBACK,UP,LOWER_UP".to_string(), "link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00".to_string())
                } else {
                    let flags = if l.up {
                        "BROADCAST,MULTICAST,UP,LOWER_UP"
                    } else {
                        "BROADCAST,MULTICAST"
                    };
                    (
                        flags.to_string(),
                        format!("link/ether 52:54:00:00:00:{:02x} brd ff:ff:ff:ff:ff:ff", l.index),
                    )
                };
                let master = l
                    .master
                    .as_deref()
                    .map(|m| format!(" master {}", m))
                    .unwrap_or_default();
                format!(
                    "{}: {}: <{}> mtu {} qdisc noqueue{} state {} mode DEFAULT group default qlen 1000\\    {}",
                    l.index,
                    l.name,
                    flags,
                    l.mtu,
                    master,
                    if l.up { "UP" } else { "DOWN" },
                    link_kind
                )
            })
            .collect();
        render_lines(&lines)
    }

    fn render_addresses(&self, only: Option<&str>) -> String {
        let mut links: Vec<&SimLink> = self
            .links
            .values()
            .filter(|l| only.map_or(true, |n| l.name == n))
            .collect();
        links.sort_by_key(|l| l.index);
        let mut lines = Vec::new();
        for link in links {
            for cidr in &link.addresses {
                let family = if cidr.contains(':') { "inet6" } else { "inet" };
                lines.push(format!(
                    "{}: {}    {} {} scope global {}\\       valid_lft forever preferred_lft forever",
                    link.index, link.name, family, cidr, link.name
                ));
            }
        }
        render_lines(&lines)
    }

    fn iptables(&mut self, args: &[&str]) -> CommandOutput {
        match args {
            _ if args.contains(&"-L") => CommandOutput::ok(self.render_iptables_listing()),
            ["-S"] | ["-S", "INPUT"] => {
                let mut lines = vec!["-P INPUT ACCEPT".to_string()];
                lines.extend(self.input_rules.iter().cloned());
                CommandOutput::ok(render_lines(&lines))
            }
            ["-A", "INPUT", rule @ ..] => {
                self.input_rules.push(canonical_input_rule(rule));
                CommandOutput::ok("")
            }
            ["-D", "INPUT", rule @ ..] => {
                let spec = canonical_input_rule(rule);
                match self.input_rules.iter().position(|r| *r == spec) {
                    Some(pos) => {
                        self.input_rules.remove(pos);
                        CommandOutput::ok("")
                    }
                    None => CommandOutput::failed(
                        1,
                        "iptables: Bad rule (does a matching rule exist in that chain?).",
                    ),
                }
            }
            _ => CommandOutput::failed(2, format!("iptables: unsupported {}", args.join(" "))),
        }
    }

    fn render_iptables_listing(&self) -> String {
        let header = " pkts bytes target     prot opt in     out     source               destination";
        let mut out = format!("Chain INPUT (policy ACCEPT 0 packets, 0 bytes)\n{}\n", header);
        for spec in &self.input_rules {
            let words: Vec<&str> = spec.split_whitespace().collect();
            let after = |flag: &str| {
                words
                    .iter()
                    .position(|w| *w == flag)
                    .and_then(|i| words.get(i + 1))
                    .copied()
            };
            out.push_str(&format!(
                "    0     0 {:<10} {:<4} --  *      *       {:<20} {:<20}\n",
                after("-j").unwrap_or(""),
                after("-p").unwrap_or("all"),
                after("-s").unwrap_or("0.0.0.0/0"),
                after("-d").unwrap_or("0.0.0.0/0"),
            ));
        }
        for chain in ["FORWARD", "OUTPUT"] {
            out.push_str(&format!(
                "\nChain {} (policy ACCEPT 0 packets, 0 bytes)\n{}\n",
                chain, header
            ));
        }
        out
    }
}

/// Rule text as `iptables -S` prints it
///
/// Matches are ordered `-s`, `-d`, `-p`, then anything else, then `-j`.
/// Addresses are reduced to their network and bare hosts gain `/32`.
fn canonical_input_rule(words: &[&str]) -> String {
    let mut source = None;
    let mut destination = None;
    let mut protocol = None;
    let mut target = None;
    let mut other = Vec::new();

    let mut iter = words.iter();
    while let Some(word) = iter.next() {
        match *word {
            "-s" | "--source" => source = iter.next().map(|a| canonical_address(a)),
            "-d" | "--destination" => destination = iter.next().map(|a| canonical_address(a)),
            "-p" | "--protocol" => protocol = iter.next().map(|p| p.to_ascii_lowercase()),
            "-j" | "--jump" => target = iter.next().map(|t| t.to_string()),
            other_word => other.push(other_word.to_string()),
        }
    }

    let mut spec = vec!["-A".to_string(), "INPUT".to_string()];
    for (flag, value) in [("-s", source), ("-d", destination), ("-p", protocol)] {
        if let Some(value) = value {
            spec.push(flag.to_string());
            spec.push(value);
        }
    }
    spec.extend(other);
    if let Some(target) = target {
        spec.push("-j".to_string());
        spec.push(target);
    }
    spec.join(" ")
}

fn canonical_spec(spec: &str) -> String {
    let words: Vec<&str> = spec.split_whitespace().collect();
    match words.as_slice() {
        ["-A", "INPUT", rule @ ..] => canonical_input_rule(rule),
        _ => spec.trim().to_string(),
    }
}

fn canonical_address(addr: &str) -> String {
    let cidr = if addr.contains('/') {
        addr.to_string()
    } else {
        format!("{}/32", addr)
    };
    match ipv4_network(&cidr) {
        Some((network, prefix)) => format!("{}/{}", network, prefix),
        None => addr.to_string(),
    }
}

fn render_lines(lines: &[String]) -> String {
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

fn ipv4_network(cidr: &str) -> Option<(IpAddr, u8)> {
    let (addr, prefix) = parse_cidr(cidr).ok()?;
    let IpAddr::V4(v4) = addr else {
        return None;
    };
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    Some((IpAddr::V4((u32::from(v4) & mask).into()), prefix))
}

fn in_network(addr: IpAddr, network: IpAddr, prefix: u8) -> bool {
    match (addr, network) {
        (IpAddr::V4(a), IpAddr::V4(n)) => {
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            u32::from(a) & mask == u32::from(n)
        }
        _ => false,
    }
}

fn connected_route(dev: &str, cidr: &str) -> Option<String> {
    let (network, prefix) = ipv4_network(cidr)?;
    let (addr, _) = cidr.split_once('/')?;
    Some(format!(
        "{}/{} dev {} proto kernel scope link src {}",
        network, prefix, dev, addr
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{commands, introspect, run_checked};

    fn host() -> SimulatedHost {
        SimulatedHost::new()
            .with_link("eth0", &["10.0.0.5/24"])
            .with_route("default via 10.0.0.1 dev eth0 proto static")
    }

    #[test]
    fn test_links_parse_back_through_introspection() {
        let host = host();
        run_checked(&host, &commands::link_add_bridge("br0")).unwrap();

        let links = introspect::link_table(&host).unwrap();
        assert!(links["br0"].bridge);
        assert!(!links["br0"].up);
        assert!(!links["eth0"].bridge);
        assert!(links["eth0"].up);
        assert_eq!(links["lo"].mtu, 65536);
    }

    #[test]
    fn test_address_add_creates_connected_route() {
        let host = host();
        run_checked(&host, &commands::link_add_bridge("br0")).unwrap();
        run_checked(&host, &commands::addr_add("192.168.50.1/24", "br0")).unwrap();

        assert!(host
            .routes()
            .contains(&"192.168.50.0/24 dev br0 proto kernel scope link src 192.168.50.1".to_string()));
        assert_eq!(
            introspect::interface_addresses(&host, "br0").unwrap(),
            vec!["192.168.50.1/24"]
        );
    }

    #[test]
    fn test_flush_drops_default_route_through_subnet() {
        let host = host();
        run_checked(&host, &commands::addr_flush("eth0")).unwrap();

        assert!(host.routes().is_empty());
        assert_eq!(introspect::default_gateway(&host, "eth0").unwrap(), None);
    }

    #[test]
    fn test_default_gateway_omits_dev_column() {
        let host = host();
        let out = run_checked(&host, &commands::default_route_show_dev("eth0")).unwrap();
        assert_eq!(out, "default via 10.0.0.1 proto static\n");
        assert_eq!(
            introspect::default_gateway(&host, "eth0").unwrap().as_deref(),
            Some("10.0.0.1")
        );
    }

    #[test]
    fn test_duplicate_bridge_is_rejected() {
        let host = host();
        run_checked(&host, &commands::link_add_bridge("br0")).unwrap();
        let err = run_checked(&host, &commands::link_add_bridge("br0")).unwrap_err();
        assert!(err.to_string().contains("File exists"));
    }

    #[test]
    fn test_deleting_bridge_releases_ports() {
        let host = host();
        run_checked(&host, &commands::link_add_bridge("br0")).unwrap();
        run_checked(&host, &commands::link_set_master("eth0", "br0")).unwrap();
        assert_eq!(host.link("eth0").unwrap().master.as_deref(), Some("br0"));

        run_checked(&host, &commands::link_delete_bridge("br0")).unwrap();
        assert!(host.link("br0").is_none());
        assert_eq!(host.link("eth0").unwrap().master, None);
    }

    #[test]
    fn test_iptables_append_and_delete() {
        let host = host();
        let args: Vec<String> = ["-p", "tcp", "-j", "DROP"].iter().map(|s| s.to_string()).collect();
        run_checked(&host, &commands::iptables_append_input(&args)).unwrap();
        assert_eq!(host.input_rules(), vec!["-A INPUT -p tcp -j DROP"]);

        let specs = run_checked(&host, &commands::iptables_input_specs()).unwrap();
        assert_eq!(specs, "-P INPUT ACCEPT\n-A INPUT -p tcp -j DROP\n");

        run_checked(&host, &commands::iptables_delete_input(&args)).unwrap();
        assert!(host.input_rules().is_empty());
        assert!(run_checked(&host, &commands::iptables_delete_input(&args)).is_err());
    }

    #[test]
    fn test_rules_listed_in_iptables_order() {
        let host = host();
        let args: Vec<String> = ["-p", "TCP", "-d", "10.0.0.7", "-s", "10.1.2.3/8", "-j", "DROP"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        run_checked(&host, &commands::iptables_append_input(&args)).unwrap();
        assert_eq!(
            host.input_rules(),
            vec!["-A INPUT -s 10.0.0.0/8 -d 10.0.0.7/32 -p tcp -j DROP"]
        );

        // Deletion matches by meaning, not by the text it was added with
        let reordered: Vec<String> = ["-s", "10.0.0.0/8", "-j", "DROP", "-p", "tcp", "-d", "10.0.0.7/32"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        run_checked(&host, &commands::iptables_delete_input(&reordered)).unwrap();
        assert!(host.input_rules().is_empty());
    }

    #[test]
    fn test_fail_once_then_succeeds() {
        let host = host();
        host.fail_once("ip link add");
        assert!(run_checked(&host, &commands::link_add_bridge("br0")).is_err());
        assert!(run_checked(&host, &commands::link_add_bridge("br0")).is_ok());
        assert_eq!(host.transcript_len(), 2);
        assert_eq!(host.mutations().len(), 2);
    }

    #[test]
    fn test_from_state_reproduces_probe() {
        let mut state = NetworkState::default();
        state.interface_states.insert(
            "eth0".into(),
            crate::model::InterfaceState {
                up: true,
                addresses: vec!["10.0.0.5/24".into()],
                mtu: 1500,
                ..Default::default()
            },
        );
        state.route_table = "default via 10.0.0.1 dev eth0\n".into();
        state.firewall_rule_specs = "-P INPUT ACCEPT\n-A INPUT -j ACCEPT\n".into();

        let host = SimulatedHost::from_state(&state);
        assert_eq!(host.link("eth0").unwrap().addresses, vec!["10.0.0.5/24"]);
        assert_eq!(host.routes(), vec!["default via 10.0.0.1 dev eth0"]);
        assert_eq!(host.input_rules(), vec!["-A INPUT -j ACCEPT"]);
    }
}
