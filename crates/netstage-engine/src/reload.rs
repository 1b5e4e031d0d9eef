//! Networking reload
//!
//! Strategies escalate from the least disruptive: a selective interface
//! reload keeps established management sessions, a full restart may not.

use netstage_core::errors::{ExError, ExErrorKind};
use netstage_core::host::{commands, run_checked, CommandRunner, HostCommand};
use netstage_core::log_step_warning;
use netstage_store::errors::Result;
use serde::Serialize;

const NETWORKING_UNIT: &str = "networking";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReloadStrategy {
    /// `ifreload -a`
    #[serde(rename = "ifreload")]
    Ifreload,
    /// `systemctl reload networking`
    #[serde(rename = "reload")]
    ServiceReload,
    /// `systemctl reload-or-restart networking`
    #[serde(rename = "reload-or-restart")]
    ServiceReloadOrRestart,
}

impl ReloadStrategy {
    pub const ESCALATION: [ReloadStrategy; 3] = [
        ReloadStrategy::Ifreload,
        ReloadStrategy::ServiceReload,
        ReloadStrategy::ServiceReloadOrRestart,
    ];

    pub fn command(&self) -> HostCommand {
        match self {
            ReloadStrategy::Ifreload => commands::ifreload_all(),
            ReloadStrategy::ServiceReload => commands::systemctl("reload", NETWORKING_UNIT),
            ReloadStrategy::ServiceReloadOrRestart => {
                commands::systemctl("reload-or-restart", NETWORKING_UNIT)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadStrategy::Ifreload => "ifreload",
            ReloadStrategy::ServiceReload => "reload",
            ReloadStrategy::ServiceReloadOrRestart => "reload-or-restart",
        }
    }
}

impl std::fmt::Display for ReloadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reload networking, returning the first strategy that succeeded
///
/// # Errors
///
/// Returns `ReloadFailed` naming every failed attempt.
pub fn reload_networking(runner: &dyn CommandRunner) -> Result<ReloadStrategy> {
    let mut failures = Vec::new();
    for strategy in ReloadStrategy::ESCALATION {
        match run_checked(runner, &strategy.command()) {
            Ok(_) => {
                tracing::info!(strategy = strategy.as_str(), "networking reloaded");
                return Ok(strategy);
            }
            Err(e) => {
                log_step_warning!("reload_networking", strategy.as_str(), e);
                failures.push(format!("{}: {}", strategy, e));
            }
        }
    }
    Err(ExError::new(ExErrorKind::ReloadFailed)
        .with_op("reload_networking")
        .with_message(format!(
            "every reload strategy failed ({})",
            failures.join("; ")
        )))
}

/// Full restart used by rollback
///
/// # Errors
///
/// Returns `HostCommand` when the restart fails.
pub fn restart_networking(runner: &dyn CommandRunner) -> Result<()> {
    run_checked(runner, &commands::systemctl("restart", NETWORKING_UNIT))
        .map(|_| ())
        .map_err(|e| ExError::from(e).with_op("restart_networking"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use netstage_core::host::SimulatedHost;

    #[test]
    fn test_first_strategy_wins() {
        let host = SimulatedHost::new();
        assert_eq!(reload_networking(&host).unwrap(), ReloadStrategy::Ifreload);
        assert_eq!(host.transcript().len(), 1);
    }

    #[test]
    fn test_serialized_names_match_display() {
        for strategy in ReloadStrategy::ESCALATION {
            assert_eq!(
                serde_json::to_value(strategy).unwrap(),
                serde_json::Value::String(strategy.as_str().to_string())
            );
        }
    }

    #[test]
    fn test_escalates_in_order() {
        let host = SimulatedHost::new();
        host.fail_on("ifreload");
        host.fail_on("systemctl reload networking");

        assert_eq!(
            reload_networking(&host).unwrap(),
            ReloadStrategy::ServiceReloadOrRestart
        );
        let issued: Vec<String> = host.transcript().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            issued,
            vec![
                "ifreload -a",
                "systemctl reload networking",
                "systemctl reload-or-restart networking"
            ]
        );
    }

    #[test]
    fn test_all_failing_is_reload_error() {
        let host = SimulatedHost::new();
        host.fail_on("ifreload");
        host.fail_on("systemctl");

        let err = reload_networking(&host).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::ReloadFailed);
    }
}
