//! Linux bridge applier
//!
//! Create order matters: the bridge is brought up and addressed before any
//! port is attached, and a port that carries addresses is only moved under
//! a bridge that already has one. Attaching first would strand the host's
//! management address on an enslaved port.

use crate::appliers::{bridge_payload, ApplyContext, Applier};
use crate::errors::{NetStageError, Result};
use crate::host::{commands, introspect, run_checked, CommandRunner};
use crate::log_step_warning;
use crate::model::payload::cidr_contains;
use crate::model::{BridgeConfig, ChangeAction, ChangeType, PendingChange};

pub struct BridgeApplier;

impl Applier for BridgeApplier {
    fn change_type(&self) -> ChangeType {
        ChangeType::Bridge
    }

    fn apply(&self, change: &PendingChange, ctx: &ApplyContext<'_>) -> Result<()> {
        let name = change.resource_id.as_str();
        match change.action {
            ChangeAction::Create => {
                let cfg = bridge_payload(change)?;
                ensure_bridge(ctx.runner, name, cfg)?;
                ctx.edit_interfaces(|file| file.add_bridge(name, cfg))
            }
            ChangeAction::Update => {
                let cfg = bridge_payload(change)?;
                remove_bridge(ctx.runner, name)?;
                ensure_bridge(ctx.runner, name, cfg)?;
                ctx.edit_interfaces(|file| {
                    file.remove_bridge(name);
                    file.add_bridge(name, cfg);
                })
            }
            ChangeAction::Delete => {
                remove_bridge(ctx.runner, name)?;
                ctx.edit_interfaces(|file| {
                    file.remove_bridge(name);
                })
            }
        }
    }
}

/// Bring a bridge to the configured live state, creating it if needed
///
/// # Errors
///
/// Fails when a command fails, the name belongs to a non-bridge link, or a
/// port cannot be attached safely.
pub fn ensure_bridge(runner: &dyn CommandRunner, name: &str, cfg: &BridgeConfig) -> Result<()> {
    let links = introspect::link_table(runner)?;
    match links.get(name) {
        Some(link) if !link.bridge => {
            return Err(NetStageError::NotABridge {
                name: name.to_string(),
            })
        }
        Some(link) => {
            tracing::debug!(bridge = name, "bridge already exists");
            if !link.up {
                run_checked(runner, &commands::link_set_up(name))?;
            }
        }
        None => {
            run_checked(runner, &commands::link_add_bridge(name))?;
            run_checked(runner, &commands::link_set_up(name))?;
        }
    }

    if cfg.vlan_aware {
        run_checked(runner, &commands::bridge_vlan_filtering(name, true))?;
    }

    let current = introspect::interface_addresses(runner, name)?;
    for addr in cfg.addresses() {
        if !current.iter().any(|a| a == addr) {
            run_checked(runner, &commands::addr_add(addr, name))?;
        }
    }

    if let Some(gateway) = &cfg.gateway {
        if introspect::default_gateway(runner, name)?.as_ref() != Some(gateway) {
            run_checked(runner, &commands::route_replace_default(gateway, name))?;
        }
    }

    for port in &cfg.ports {
        attach_port(runner, name, port)?;
    }
    Ok(())
}

/// Enslave `port` to `bridge`, moving its addressing when that is safe
///
/// # Errors
///
/// Returns `UnsafePortAttach` when the port has addresses and the bridge has
/// none, `LinkNotFound` when the port is absent, or the failing command.
pub fn attach_port(runner: &dyn CommandRunner, bridge: &str, port: &str) -> Result<()> {
    let links = introspect::link_table(runner)?;
    let link = introspect::require_link(&links, port)?;
    if link.master.as_deref() == Some(bridge) {
        if !link.up {
            run_checked(runner, &commands::link_set_up(port))?;
        }
        return Ok(());
    }

    let port_addrs = introspect::interface_addresses(runner, port)?;
    if !port_addrs.is_empty() {
        let bridge_addrs = introspect::interface_addresses(runner, bridge)?;
        if bridge_addrs.is_empty() {
            return Err(NetStageError::UnsafePortAttach {
                port: port.to_string(),
                bridge: bridge.to_string(),
            });
        }

        let port_gateway = introspect::default_gateway(runner, port)?;
        run_checked(runner, &commands::addr_flush(port))?;

        if let Some(gateway) = port_gateway {
            let bridge_has_default = introspect::default_gateway(runner, bridge)?.is_some();
            let reachable = bridge_addrs.iter().any(|a| cidr_contains(a, &gateway));
            if !bridge_has_default && reachable {
                run_checked(runner, &commands::route_replace_default(&gateway, bridge))?;
            } else if !bridge_has_default {
                tracing::warn!(
                    port,
                    bridge,
                    gateway = %gateway,
                    "default route of port is not reachable through bridge; not migrated"
                );
            }
        }
    }

    if let Err(err) = run_checked(runner, &commands::link_set_master(port, bridge)) {
        // Put the port's addresses back so it stays reachable
        for addr in &port_addrs {
            if let Err(restore_err) = run_checked(runner, &commands::addr_add(addr, port)) {
                log_step_warning!(
                    "attach_port",
                    "restore_port_address",
                    restore_err,
                    port,
                    bridge,
                    address = %addr
                );
            }
        }
        return Err(err);
    }
    run_checked(runner, &commands::link_set_up(port))?;
    Ok(())
}

/// Detach ports and delete the bridge; absent bridges are left alone
///
/// # Errors
///
/// Fails when the name is a non-bridge link or a command fails.
pub fn remove_bridge(runner: &dyn CommandRunner, name: &str) -> Result<()> {
    let links = introspect::link_table(runner)?;
    let Some(link) = links.get(name) else {
        tracing::debug!(bridge = name, "bridge already absent");
        return Ok(());
    };
    if !link.bridge {
        return Err(NetStageError::NotABridge {
            name: name.to_string(),
        });
    }

    for port in links.values().filter(|l| l.master.as_deref() == Some(name)) {
        run_checked(runner, &commands::link_set_nomaster(&port.name))?;
    }
    run_checked(runner, &commands::link_set_down(name))?;
    run_checked(runner, &commands::link_delete_bridge(name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appliers::test_support::change;
    use crate::config::HostFiles;
    use crate::host::SimulatedHost;
    use crate::model::ChangeConfig;

    fn br0(ports: &[&str]) -> BridgeConfig {
        BridgeConfig {
            ports: ports.iter().map(|p| p.to_string()).collect(),
            ip_address: Some("192.168.50.1/24".into()),
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_create_orders_addressing_before_ports() {
        let host = SimulatedHost::new().with_link("eth1", &[]);
        ensure_bridge(&host, "br0", &br0(&["eth1"])).unwrap();

        let mutations: Vec<String> = host.mutations().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            mutations,
            vec![
                "ip link add br0 type bridge",
                "ip link set br0 up",
                "ip addr add 192.168.50.1/24 dev br0",
                "ip link set eth1 master br0",
                "ip link set eth1 up",
            ]
        );
        assert_eq!(host.link("eth1").unwrap().master.as_deref(), Some("br0"));
    }

    #[test]
    fn test_create_twice_issues_no_further_mutations() {
        let host = SimulatedHost::new().with_link("eth1", &[]);
        ensure_bridge(&host, "br0", &br0(&["eth1"])).unwrap();
        let after_first = host.mutations().len();

        ensure_bridge(&host, "br0", &br0(&["eth1"])).unwrap();
        assert_eq!(host.mutations().len(), after_first);
    }

    #[test]
    fn test_addressed_port_refused_for_bare_bridge() {
        let host = SimulatedHost::new().with_link("eth0", &["10.0.0.5/24"]);
        let cfg = BridgeConfig {
            ports: vec!["eth0".into()],
            ..BridgeConfig::default()
        };

        let err = ensure_bridge(&host, "br0", &cfg).unwrap_err();
        assert!(matches!(err, NetStageError::UnsafePortAttach { .. }));
        assert_eq!(host.link("eth0").unwrap().addresses, vec!["10.0.0.5/24"]);
    }

    #[test]
    fn test_addressed_port_is_flushed_and_route_migrated() {
        let host = SimulatedHost::new()
            .with_link("eth0", &["192.168.50.20/24"])
            .with_route("default via 192.168.50.254 dev eth0 proto static");

        ensure_bridge(&host, "br0", &br0(&["eth0"])).unwrap();

        assert!(host.link("eth0").unwrap().addresses.is_empty());
        assert!(host
            .routes()
            .contains(&"default via 192.168.50.254 dev br0".to_string()));
    }

    #[test]
    fn test_failed_enslave_restores_port_addresses() {
        let host = SimulatedHost::new()
            .with_link("eth0", &["192.168.50.20/24"])
            .with_link("br0", &["192.168.50.1/24"]);
        host.fail_on("ip link set eth0 master");

        let err = attach_port(&host, "br0", "eth0").unwrap_err();
        assert!(matches!(err, NetStageError::HostCommandFailed { .. }));
        assert_eq!(host.link("eth0").unwrap().addresses, vec!["192.168.50.20/24"]);
    }

    #[test]
    fn test_existing_non_bridge_name_is_rejected() {
        let host = SimulatedHost::new().with_link("eth0", &[]);
        let err = ensure_bridge(&host, "eth0", &BridgeConfig::default()).unwrap_err();
        assert!(matches!(err, NetStageError::NotABridge { .. }));
    }

    #[test]
    fn test_remove_detaches_ports_then_deletes() {
        let host = SimulatedHost::new().with_link("eth1", &[]);
        ensure_bridge(&host, "br0", &br0(&["eth1"])).unwrap();
        let start = host.transcript_len();

        remove_bridge(&host, "br0").unwrap();

        let mutations: Vec<String> = host
            .mutations_since(start)
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            mutations,
            vec![
                "ip link set eth1 nomaster",
                "ip link set br0 down",
                "ip link delete br0 type bridge",
            ]
        );
        assert!(host.link("br0").is_none());

        // Absent bridge is a no-op
        remove_bridge(&host, "br0").unwrap();
    }

    #[test]
    fn test_apply_writes_stanza() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new().with_link("eth1", &[]);
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());

        let create = change(ChangeAction::Create, "br0", ChangeConfig::Bridge(br0(&["eth1"])));
        BridgeApplier.apply(&create, &ctx).unwrap();

        let written = std::fs::read_to_string(&files.interfaces).unwrap();
        assert!(written.contains("iface br0 inet static"));
        assert!(written.contains("bridge-ports eth1"));

        let delete = change(ChangeAction::Delete, "br0", ChangeConfig::Bridge(BridgeConfig::default()));
        BridgeApplier.apply(&delete, &ctx).unwrap();
        let written = std::fs::read_to_string(&files.interfaces).unwrap();
        assert!(!written.contains("iface br0"));
        assert!(host.link("br0").is_none());
    }
}
