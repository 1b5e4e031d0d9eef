//! Boot-time restore of persisted bridges and interfaces

#![allow(clippy::result_large_err)]

use netstage_core::appliers::bridge::ensure_bridge;
use netstage_core::appliers::interface::configure_interface;
use netstage_core::host::CommandRunner;
use netstage_core::model::BridgeStatus;
use netstage_core::{log_op_end, log_op_start};
use netstage_store::errors::Result;
use netstage_store::ResourceRepo;
use rusqlite::Connection;
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    pub bridges_restored: Vec<String>,
    /// `(name, error)` for bridges that could not be brought up
    pub bridges_failed: Vec<(String, String)>,
    pub interfaces_restored: Vec<String>,
    pub interfaces_failed: Vec<(String, String)>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.bridges_failed.is_empty() && self.interfaces_failed.is_empty()
    }
}

/// Re-establish every autostart bridge, then every autostart interface
///
/// Appliers skip work already done, so running this on a configured host
/// issues no mutations. A failing resource does not stop the others.
///
/// # Errors
///
/// Returns `Persistence` when the definitions cannot be read or a bridge
/// status cannot be recorded.
pub fn restore_persisted(conn: &Connection, runner: &dyn CommandRunner) -> Result<RestoreReport> {
    let start = Instant::now();
    log_op_start!("restore_persisted");

    let repo = ResourceRepo::new(conn);
    let mut report = RestoreReport::default();

    for bridge in repo.list_bridges()?.into_iter().filter(|b| b.config.autostart) {
        match ensure_bridge(runner, &bridge.name, &bridge.config) {
            Ok(()) => {
                repo.set_bridge_status(&bridge.name, BridgeStatus::Active, None)?;
                report.bridges_restored.push(bridge.name);
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(bridge = %bridge.name, error = %message, "bridge restore failed");
                repo.set_bridge_status(&bridge.name, BridgeStatus::Error, Some(&message))?;
                report.bridges_failed.push((bridge.name, message));
            }
        }
    }

    for iface in repo.list_interfaces()?.into_iter().filter(|i| i.config.autostart) {
        match configure_interface(runner, &iface.name, &iface.config, false) {
            Ok(()) => report.interfaces_restored.push(iface.name),
            Err(e) => {
                tracing::warn!(interface = %iface.name, error = %e, "interface restore failed");
                report.interfaces_failed.push((iface.name, e.to_string()));
            }
        }
    }

    log_op_end!(
        "restore_persisted",
        duration_ms = start.elapsed().as_millis() as u64,
        bridges = report.bridges_restored.len(),
        failures = report.bridges_failed.len() + report.interfaces_failed.len()
    );
    Ok(report)
}
