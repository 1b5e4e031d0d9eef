//! Snapshot Capturer
//!
//! Probes are best-effort per sub-resource: a probe that fails is logged
//! and its field left empty, because a partial baseline still lets rollback
//! restore everything else. Host files are the exception. Rollback rewrites
//! them from the snapshot, so an unreadable file aborts the capture.

use netstage_core::config::HostFiles;
use netstage_core::errors::{ExError, ExErrorKind};
use netstage_core::files::read_optional;
use netstage_core::host::introspect::{link_table, parse_addresses};
use netstage_core::host::{commands, run_checked, CommandRunner, HostCommand};
use netstage_core::model::{InterfaceState, NetworkSnapshot, NetworkState};
use netstage_core::{log_phase, log_step_warning};
use netstage_store::errors::Result;
use netstage_store::SnapshotRepo;
use std::collections::BTreeMap;

pub struct SnapshotCapturer<'a> {
    runner: &'a dyn CommandRunner,
    files: &'a HostFiles,
}

impl<'a> SnapshotCapturer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, files: &'a HostFiles) -> Self {
        Self { runner, files }
    }

    /// Read the current host state without persisting it
    ///
    /// # Errors
    ///
    /// Returns `SnapshotFailed` when a host file exists but cannot be read.
    pub fn probe(&self) -> Result<NetworkState> {
        let route_table = best_effort(self.runner, "route table", &commands::route_show());
        let firewall_rules = best_effort(self.runner, "firewall rules", &commands::iptables_list());
        let firewall_rule_specs =
            best_effort(self.runner, "firewall rule specs", &commands::iptables_input_specs());
        let interface_states = probe_interfaces(self.runner);

        let read = |path: &std::path::Path| {
            read_optional(path).map_err(|e| {
                ExError::new(ExErrorKind::SnapshotFailed)
                    .with_op("probe")
                    .with_entity_id(path.display().to_string())
                    .with_message("host file unreadable; refusing to snapshot")
                    .with_source(e.into())
            })
        };

        Ok(NetworkState {
            interface_states,
            route_table,
            firewall_rules,
            firewall_rule_specs,
            interfaces_file: read(&self.files.interfaces)?,
            resolv_conf: read(&self.files.resolv_conf)?,
        })
    }

    /// Probe and persist an `active` snapshot
    ///
    /// # Errors
    ///
    /// Returns `SnapshotFailed` if the probe or the insert fails.
    pub fn capture(&self, repo: &SnapshotRepo<'_>) -> Result<NetworkSnapshot> {
        log_phase!("capture_snapshot", "probing");
        let snapshot = NetworkSnapshot::new(self.probe()?);

        repo.insert(&snapshot).map_err(|e| {
            ExError::new(ExErrorKind::SnapshotFailed)
                .with_op("capture_snapshot")
                .with_snapshot_id(snapshot.id.clone())
                .with_message("could not persist snapshot")
                .with_source(e)
        })?;

        tracing::info!(
            snapshot_id = %snapshot.id,
            interfaces = snapshot.state.interface_states.len(),
            "snapshot captured"
        );
        Ok(snapshot)
    }
}

/// Per-link state: flags, sorted addresses, MTU, master and routes
pub fn probe_interfaces(runner: &dyn CommandRunner) -> BTreeMap<String, InterfaceState> {
    let links = match link_table(runner) {
        Ok(links) => links,
        Err(e) => {
            log_step_warning!("snapshot_capture", "links", e);
            return BTreeMap::new();
        }
    };
    let mut addresses = parse_addresses(&best_effort(runner, "addresses", &commands::addr_show_all()));

    links
        .into_values()
        .map(|link| {
            let mut addrs = addresses.remove(&link.name).unwrap_or_default();
            addrs.sort();
            let routes = best_effort(
                runner,
                "interface routes",
                &commands::route_show_dev(&link.name),
            );
            let state = InterfaceState {
                up: link.up,
                addresses: addrs,
                mtu: link.mtu,
                master: link.master,
                bridge: link.bridge,
                mac_address: link.mac_address,
                routes,
            };
            (link.name, state)
        })
        .collect()
}

fn best_effort(runner: &dyn CommandRunner, what: &str, command: &HostCommand) -> String {
    match run_checked(runner, command) {
        Ok(output) => output,
        Err(e) => {
            log_step_warning!("snapshot_capture", what, e, command = %command);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstage_core::host::SimulatedHost;
    use netstage_store::db::open_store_in_memory;

    #[test]
    fn test_probe_collects_links_routes_and_rules() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        std::fs::write(&files.interfaces, "auto lo\niface lo inet loopback\n").unwrap();
        let host = SimulatedHost::new()
            .with_link("eth0", &["10.0.0.5/24"])
            .with_route("default via 10.0.0.1 dev eth0")
            .with_input_rule("-A INPUT -p tcp -j ACCEPT");

        let state = SnapshotCapturer::new(&host, &files).probe().unwrap();

        let eth0 = &state.interface_states["eth0"];
        assert!(eth0.up);
        assert_eq!(eth0.addresses, vec!["10.0.0.5/24"]);
        assert!(state.route_table.contains("default via 10.0.0.1 dev eth0"));
        assert_eq!(state.input_rule_specs(), vec!["-A INPUT -p tcp -j ACCEPT"]);
        assert!(state.interfaces_file.is_some());
        assert!(state.resolv_conf.is_none());
        assert!(host.mutations().is_empty());
    }

    #[test]
    fn test_failed_probe_leaves_field_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new().with_link("eth0", &[]);
        host.fail_on("iptables");

        let state = SnapshotCapturer::new(&host, &files).probe().unwrap();

        assert!(state.firewall_rules.is_empty());
        assert!(state.interface_states.contains_key("eth0"));
    }

    #[test]
    fn test_capture_persists_active_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let conn = open_store_in_memory().unwrap();
        let repo = SnapshotRepo::new(&conn);
        let host = SimulatedHost::new();

        let snapshot = SnapshotCapturer::new(&host, &files).capture(&repo).unwrap();

        let stored = repo.get(&snapshot.id).unwrap();
        assert_eq!(stored.status, netstage_core::SnapshotStatus::Active);
        assert_eq!(stored.state, snapshot.state);
    }
}
