//! Constructors for every host command the change manager issues
//!
//! Keeping the argument vectors in one place keeps probes, appliers,
//! rollback and the simulated host in agreement about the exact syntax.

use crate::host::HostCommand;

fn ip<const N: usize>(args: [&str; N]) -> HostCommand {
    HostCommand::new("ip").args(args)
}

// ---- probes ----

pub fn route_show() -> HostCommand {
    ip(["route", "show"])
}

pub fn route_show_dev(dev: &str) -> HostCommand {
    ip(["route", "show", "dev", dev])
}

pub fn default_route_show_dev(dev: &str) -> HostCommand {
    ip(["route", "show", "default", "dev", dev])
}

pub fn link_show_all() -> HostCommand {
    ip(["-o", "link", "show"])
}

pub fn link_show_bridges() -> HostCommand {
    ip(["-o", "link", "show", "type", "bridge"])
}

pub fn addr_show_all() -> HostCommand {
    ip(["-o", "addr", "show"])
}

pub fn addr_show_dev(dev: &str) -> HostCommand {
    ip(["-o", "addr", "show", "dev", dev])
}

pub fn iptables_list() -> HostCommand {
    HostCommand::new("iptables").args(["-L", "-n", "-v"])
}

pub fn iptables_input_specs() -> HostCommand {
    HostCommand::new("iptables").args(["-S", "INPUT"])
}

// ---- links ----

pub fn link_add_bridge(name: &str) -> HostCommand {
    ip(["link", "add", name, "type", "bridge"])
}

pub fn link_delete_bridge(name: &str) -> HostCommand {
    ip(["link", "delete", name, "type", "bridge"])
}

pub fn link_set_up(name: &str) -> HostCommand {
    ip(["link", "set", name, "up"])
}

pub fn link_set_down(name: &str) -> HostCommand {
    ip(["link", "set", name, "down"])
}

pub fn link_set_master(port: &str, bridge: &str) -> HostCommand {
    ip(["link", "set", port, "master", bridge])
}

pub fn link_set_nomaster(port: &str) -> HostCommand {
    ip(["link", "set", port, "nomaster"])
}

pub fn link_set_mtu(name: &str, mtu: u32) -> HostCommand {
    ip(["link", "set", name, "mtu"]).arg(mtu.to_string())
}

pub fn bridge_vlan_filtering(name: &str, enabled: bool) -> HostCommand {
    ip(["link", "set", name, "type", "bridge", "vlan_filtering"])
        .arg(if enabled { "1" } else { "0" })
}

// ---- addresses ----

pub fn addr_add(cidr: &str, dev: &str) -> HostCommand {
    ip(["addr", "add", cidr, "dev", dev])
}

pub fn addr_del(cidr: &str, dev: &str) -> HostCommand {
    ip(["addr", "del", cidr, "dev", dev])
}

pub fn addr_flush(dev: &str) -> HostCommand {
    ip(["addr", "flush", "dev", dev])
}

// ---- routes ----

pub fn route_add(destination: &str, gateway: &str, dev: &str) -> HostCommand {
    ip(["route", "add", destination, "via", gateway, "dev", dev])
}

pub fn route_del(destination: &str) -> HostCommand {
    ip(["route", "del", destination])
}

pub fn route_replace_default(gateway: &str, dev: &str) -> HostCommand {
    ip(["route", "replace", "default", "via", gateway, "dev", dev])
}

pub fn route_del_default_dev(dev: &str) -> HostCommand {
    ip(["route", "del", "default", "dev", dev])
}

/// Re-add a route exactly as `ip route show` printed it
pub fn route_add_line(line: &str) -> HostCommand {
    HostCommand::new("ip")
        .args(["route", "add"])
        .args(line.split_whitespace())
}

/// Remove a route exactly as `ip route show` printed it
pub fn route_del_line(line: &str) -> HostCommand {
    HostCommand::new("ip")
        .args(["route", "del"])
        .args(line.split_whitespace())
}

// ---- firewall ----

pub fn iptables_append_input(match_args: &[String]) -> HostCommand {
    HostCommand::new("iptables")
        .args(["-A", "INPUT"])
        .args(match_args.iter().cloned())
}

pub fn iptables_delete_input(match_args: &[String]) -> HostCommand {
    HostCommand::new("iptables")
        .args(["-D", "INPUT"])
        .args(match_args.iter().cloned())
}

/// Replay an `iptables -S` line (`-A INPUT ...`)
pub fn iptables_from_spec(spec: &str) -> HostCommand {
    HostCommand::new("iptables").args(spec.split_whitespace())
}

/// Delete the rule an `iptables -S` line (`-A INPUT ...`) describes
pub fn iptables_delete_spec(spec: &str) -> HostCommand {
    let mut words = spec.split_whitespace();
    let _append = words.next();
    HostCommand::new("iptables").arg("-D").args(words)
}

// ---- services ----

pub fn ifreload_all() -> HostCommand {
    HostCommand::new("ifreload").arg("-a")
}

pub fn systemctl(verb: &str, unit: &str) -> HostCommand {
    HostCommand::new("systemctl").args([verb, unit])
}

pub fn dhclient(dev: &str) -> HostCommand {
    HostCommand::new("dhclient").arg(dev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_commands_match_iproute2_syntax() {
        assert_eq!(link_add_bridge("br0").to_string(), "ip link add br0 type bridge");
        assert_eq!(
            link_set_master("eth0", "br0").to_string(),
            "ip link set eth0 master br0"
        );
        assert_eq!(
            link_delete_bridge("br0").to_string(),
            "ip link delete br0 type bridge"
        );
    }

    #[test]
    fn test_spec_delete_swaps_operation() {
        let cmd = iptables_delete_spec("-A INPUT -p tcp -s 10.0.0.0/8 -j DROP");
        assert_eq!(cmd.to_string(), "iptables -D INPUT -p tcp -s 10.0.0.0/8 -j DROP");
        assert!(iptables_from_spec("-A INPUT -j ACCEPT").is_mutating());
    }

    #[test]
    fn test_route_line_replay() {
        let line = "default via 10.0.0.1 dev eth0 proto static";
        assert_eq!(
            route_add_line(line).to_string(),
            "ip route add default via 10.0.0.1 dev eth0 proto static"
        );
    }
}
