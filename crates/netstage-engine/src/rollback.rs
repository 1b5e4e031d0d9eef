//! Rollback Engine
//!
//! Puts the host back into the state recorded by a snapshot. Sub-steps are
//! best-effort: each failure becomes a warning in the report and the next
//! step still runs. Only an unloadable snapshot or a failed networking
//! restart is fatal, and both leave the snapshot `active` so a later
//! recovery can try again.

use crate::capture::probe_interfaces;
use crate::reload::restart_networking;
use netstage_core::config::HostFiles;
use netstage_core::errors::{ExError, ExErrorKind};
use netstage_core::files::{reconcile, remove_backup, restore_backup};
use netstage_core::host::{commands, run_checked, CommandRunner, HostCommand};
use netstage_core::model::snapshot::{input_rule_specs, route_lines};
use netstage_core::model::{InterfaceState, NetworkSnapshot, SnapshotStatus};
use netstage_core::{log_op_end, log_op_error, log_op_start, log_phase, log_step_warning};
use netstage_store::errors::Result;
use netstage_store::{ChangeLedger, SnapshotRepo};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

/// What a completed rollback did and what it could not do
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    pub snapshot_id: String,
    /// Sub-steps that failed and were skipped
    pub warnings: Vec<String>,
    /// Pending ledger entries discarded
    pub discarded: usize,
    pub restored_files: Vec<PathBuf>,
    pub commands_issued: usize,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, step: &'static str, warning: String) {
        log_step_warning!("rollback", step, warning, snapshot_id = %self.snapshot_id);
        self.warnings.push(warning);
    }
}

pub struct RollbackEngine<'a> {
    runner: &'a dyn CommandRunner,
    files: &'a HostFiles,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(runner: &'a dyn CommandRunner, files: &'a HostFiles) -> Self {
        Self { runner, files }
    }

    /// Restore the host to snapshot `snapshot_id` and close the transaction
    ///
    /// # Errors
    ///
    /// Returns `RollbackFailed` when the snapshot cannot be loaded, networking
    /// cannot be restarted or the final bookkeeping fails; `IllegalTransition`
    /// when the snapshot is no longer active.
    pub fn rollback(&self, conn: &Connection, snapshot_id: &str) -> Result<RollbackReport> {
        let start = Instant::now();
        log_op_start!("rollback", snapshot_id = snapshot_id);

        match self.run(conn, snapshot_id) {
            Ok(report) => {
                log_op_end!(
                    "rollback",
                    duration_ms = start.elapsed().as_millis() as u64,
                    snapshot_id = snapshot_id,
                    warnings = report.warnings.len()
                );
                Ok(report)
            }
            Err(err) => {
                log_op_error!(
                    "rollback",
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    snapshot_id = snapshot_id
                );
                Err(err)
            }
        }
    }

    fn run(&self, conn: &Connection, snapshot_id: &str) -> Result<RollbackReport> {
        let snapshots = SnapshotRepo::new(conn);
        let snapshot = snapshots.get(snapshot_id).map_err(|e| {
            critical(snapshot_id, "snapshot could not be loaded").with_source(e)
        })?;
        if snapshot.status != SnapshotStatus::Active {
            return Err(ExError::new(ExErrorKind::IllegalTransition)
                .with_op("rollback")
                .with_snapshot_id(snapshot_id)
                .with_message(format!("snapshot is {}, not active", snapshot.status)));
        }

        let mut report = RollbackReport {
            snapshot_id: snapshot_id.to_string(),
            ..RollbackReport::default()
        };

        log_phase!("rollback", "restoring_files", snapshot_id = snapshot_id);
        self.restore_files(&snapshot, &mut report);

        log_phase!("rollback", "restoring_links", snapshot_id = snapshot_id);
        self.restore_links(&snapshot, &mut report);

        // Address changes above add and drop connected routes, so the route
        // and rule diff is taken against a fresh probe.
        log_phase!("rollback", "restoring_routes", snapshot_id = snapshot_id);
        self.restore_routes(&snapshot, &mut report);

        log_phase!("rollback", "restoring_firewall", snapshot_id = snapshot_id);
        self.restore_firewall(&snapshot, &mut report);

        log_phase!("rollback", "restarting_networking", snapshot_id = snapshot_id);
        restart_networking(self.runner).map_err(|e| {
            critical(snapshot_id, "networking restart failed; manual intervention required")
                .with_source(e)
        })?;

        report.discarded = close_transaction(conn, snapshot_id)
            .map_err(|e| critical(snapshot_id, "could not record rollback").with_source(e))?;
        remove_backups("rollback", self.files, &snapshot);

        Ok(report)
    }

    fn restore_files(&self, snapshot: &NetworkSnapshot, report: &mut RollbackReport) {
        let files = [
            (&self.files.interfaces, snapshot.state.interfaces_file.as_deref()),
            (&self.files.resolv_conf, snapshot.state.resolv_conf.as_deref()),
        ];
        for (path, content) in files {
            let outcome = restore_backup(path, snapshot.created_at).and_then(|restored| {
                if restored {
                    return Ok(());
                }
                reconcile(path, content)
            });
            match outcome {
                Ok(()) => report.restored_files.push(path.clone()),
                Err(e) => report.warn("restoring_files", format!("restore {}: {}", path.display(), e)),
            }
        }
    }

    fn restore_links(&self, snapshot: &NetworkSnapshot, report: &mut RollbackReport) {
        if snapshot.state.interface_states.is_empty() {
            report.warn("restoring_links", "snapshot has no interface state; links not restored".to_string());
            return;
        }
        let live = probe_interfaces(self.runner);
        let (plan, skipped) = plan_link_restore(&snapshot.state.interface_states, &live);
        for warning in skipped {
            report.warn("restoring_links", warning);
        }
        self.issue("restoring_links", &plan, report);
    }

    fn restore_routes(&self, snapshot: &NetworkSnapshot, report: &mut RollbackReport) {
        let wanted = snapshot.state.route_lines();
        if wanted.is_empty() {
            report.warn("restoring_routes", "snapshot route table is empty; routes not restored".to_string());
            return;
        }
        let live = match run_checked(self.runner, &commands::route_show()) {
            Ok(text) => route_lines(&text),
            Err(e) => {
                report.warn("restoring_routes", format!("route probe: {}", e));
                return;
            }
        };

        let mut plan: Vec<HostCommand> = live
            .iter()
            .filter(|line| !wanted.contains(line))
            .map(|line| commands::route_del_line(line))
            .collect();
        // Defaults last: their gateway must already be reachable
        let mut missing: Vec<&String> = wanted.iter().filter(|line| !live.contains(line)).collect();
        missing.sort_by_key(|line| line.starts_with("default"));
        plan.extend(missing.into_iter().map(|line| commands::route_add_line(line)));

        self.issue("restoring_routes", &plan, report);
    }

    fn restore_firewall(&self, snapshot: &NetworkSnapshot, report: &mut RollbackReport) {
        if snapshot.state.firewall_rule_specs.trim().is_empty() {
            report.warn("restoring_firewall", "snapshot has no firewall rule specs; rules not restored".to_string());
            return;
        }
        let live = match run_checked(self.runner, &commands::iptables_input_specs()) {
            Ok(text) => input_rule_specs(&text),
            Err(e) => {
                report.warn("restoring_firewall", format!("firewall probe: {}", e));
                return;
            }
        };
        let (extra, missing) = multiset_diff(&snapshot.state.input_rule_specs(), &live);

        let plan: Vec<HostCommand> = extra
            .iter()
            .map(|spec| commands::iptables_delete_spec(spec))
            .chain(missing.iter().map(|spec| commands::iptables_from_spec(spec)))
            .collect();
        self.issue("restoring_firewall", &plan, report);
    }

    fn issue(&self, step: &'static str, plan: &[HostCommand], report: &mut RollbackReport) {
        for command in plan {
            report.commands_issued += 1;
            if let Err(e) = run_checked(self.runner, command) {
                report.warn(step, format!("{}: {}", command, e));
            }
        }
    }
}

/// Drop the file backups of a closed transaction; failures are only logged
pub(crate) fn remove_backups(op: &'static str, files: &HostFiles, snapshot: &NetworkSnapshot) {
    for path in [&files.interfaces, &files.resolv_conf] {
        if let Err(e) = remove_backup(path, snapshot.created_at) {
            log_step_warning!(op, "removing_backups", e, snapshot_id = %snapshot.id);
        }
    }
}

/// Mark the snapshot rolled back and discard every pending change, atomically
fn close_transaction(conn: &Connection, snapshot_id: &str) -> Result<usize> {
    let tx = conn
        .unchecked_transaction()
        .map_err(netstage_store::errors::from_rusqlite)?;
    SnapshotRepo::new(&tx).mark_rolled_back(snapshot_id)?;
    let discarded = ChangeLedger::new(&tx).discard_all()?;
    tx.commit().map_err(netstage_store::errors::from_rusqlite)?;
    Ok(discarded)
}

fn critical(snapshot_id: &str, message: &str) -> ExError {
    ExError::new(ExErrorKind::RollbackFailed)
        .with_op("rollback")
        .with_snapshot_id(snapshot_id)
        .with_message(message)
}

/// Commands that move live links back to their snapshot state
///
/// Returns the commands in execution order plus a warning for every link
/// that cannot be recreated.
pub fn plan_link_restore(
    before: &BTreeMap<String, InterfaceState>,
    live: &BTreeMap<String, InterfaceState>,
) -> (Vec<HostCommand>, Vec<String>) {
    let mut plan = Vec::new();
    let mut skipped = Vec::new();

    // Release ports first so bridges can be deleted and re-parented
    for (name, now) in live {
        let Some(was) = before.get(name) else { continue };
        if now.master.is_some() && now.master != was.master {
            plan.push(commands::link_set_nomaster(name));
        }
    }
    for (name, now) in live.iter().filter(|(name, _)| !before.contains_key(*name)) {
        if now.bridge {
            plan.push(commands::link_set_down(name));
            plan.push(commands::link_delete_bridge(name));
        } else {
            skipped.push(format!("link {} did not exist at snapshot time; left in place", name));
        }
    }
    for (name, was) in before.iter().filter(|(name, _)| !live.contains_key(*name)) {
        if was.bridge {
            plan.push(commands::link_add_bridge(name));
        } else {
            skipped.push(format!("link {} has disappeared; cannot recreate", name));
        }
    }

    let absent = InterfaceState::default();
    for (name, was) in before {
        let now = match live.get(name) {
            Some(now) => now,
            None if was.bridge => &absent,
            None => continue,
        };
        if was.mtu != 0 && now.mtu != was.mtu {
            plan.push(commands::link_set_mtu(name, was.mtu));
        }
        for stale in now.addresses.iter().filter(|a| !was.addresses.contains(a)) {
            plan.push(commands::addr_del(stale, name));
        }
        for missing in was.addresses.iter().filter(|a| !now.addresses.contains(a)) {
            plan.push(commands::addr_add(missing, name));
        }
    }
    // Re-enslave after every bridge exists again
    for (name, was) in before {
        let now_master = live.get(name).and_then(|l| l.master.as_ref());
        if let Some(master) = &was.master {
            if now_master != Some(master) {
                plan.push(commands::link_set_master(name, master));
            }
        }
    }
    for (name, was) in before {
        let now_up = live.get(name).is_some_and(|l| l.up);
        if live.contains_key(name) || was.bridge {
            match (was.up, now_up) {
                (true, false) => plan.push(commands::link_set_up(name)),
                (false, true) => plan.push(commands::link_set_down(name)),
                _ => {}
            }
        }
    }

    (plan, skipped)
}

/// Entries of `live` not in `wanted`, and entries of `wanted` not in `live`, counting duplicates
fn multiset_diff(wanted: &[String], live: &[String]) -> (Vec<String>, Vec<String>) {
    let mut unmatched: Vec<&String> = wanted.iter().collect();
    let mut extra = Vec::new();
    for rule in live {
        match unmatched.iter().position(|w| *w == rule) {
            Some(pos) => {
                unmatched.remove(pos);
            }
            None => extra.push(rule.clone()),
        }
    }
    (extra, unmatched.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(up: bool, addrs: &[&str], master: Option<&str>, bridge: bool) -> InterfaceState {
        InterfaceState {
            up,
            addresses: addrs.iter().map(|a| a.to_string()).collect(),
            mtu: 1500,
            master: master.map(str::to_string),
            bridge,
            ..InterfaceState::default()
        }
    }

    fn rendered(plan: &[HostCommand]) -> Vec<String> {
        plan.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_plan_undoes_new_bridge_and_flush() {
        let before = BTreeMap::from([
            ("eth0".to_string(), link(true, &["10.0.0.5/24"], None, false)),
        ]);
        let live = BTreeMap::from([
            ("eth0".to_string(), link(true, &[], Some("br0"), false)),
            ("br0".to_string(), link(true, &["192.168.50.1/24"], None, true)),
        ]);

        let (plan, skipped) = plan_link_restore(&before, &live);

        assert!(skipped.is_empty());
        assert_eq!(
            rendered(&plan),
            vec![
                "ip link set eth0 nomaster",
                "ip link set br0 down",
                "ip link delete br0 type bridge",
                "ip addr add 10.0.0.5/24 dev eth0",
            ]
        );
    }

    #[test]
    fn test_plan_recreates_deleted_bridge() {
        let before = BTreeMap::from([
            ("br1".to_string(), link(true, &["10.1.0.1/24"], None, true)),
            ("eth1".to_string(), link(true, &[], Some("br1"), false)),
        ]);
        let live = BTreeMap::from([("eth1".to_string(), link(true, &[], None, false))]);

        let (plan, _) = plan_link_restore(&before, &live);

        assert_eq!(
            rendered(&plan),
            vec![
                "ip link add br1 type bridge",
                "ip link set br1 mtu 1500",
                "ip addr add 10.1.0.1/24 dev br1",
                "ip link set eth1 master br1",
                "ip link set br1 up",
            ]
        );
    }

    #[test]
    fn test_plan_is_empty_when_nothing_changed() {
        let state = BTreeMap::from([("eth0".to_string(), link(true, &["10.0.0.5/24"], None, false))]);
        let (plan, skipped) = plan_link_restore(&state, &state);
        assert!(plan.is_empty());
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_vanished_physical_link_is_reported() {
        let before = BTreeMap::from([("eth9".to_string(), link(true, &[], None, false))]);
        let (plan, skipped) = plan_link_restore(&before, &BTreeMap::new());
        assert!(plan.is_empty());
        assert_eq!(skipped.len(), 1);
    }

    #[test]
    fn test_multiset_diff_counts_duplicates() {
        let wanted = vec!["-A INPUT -j ACCEPT".to_string(), "-A INPUT -j ACCEPT".to_string()];
        let live = vec![
            "-A INPUT -j ACCEPT".to_string(),
            "-A INPUT -p tcp -j DROP".to_string(),
        ];
        let (extra, missing) = multiset_diff(&wanted, &live);
        assert_eq!(extra, vec!["-A INPUT -p tcp -j DROP"]);
        assert_eq!(missing, vec!["-A INPUT -j ACCEPT"]);
    }
}
