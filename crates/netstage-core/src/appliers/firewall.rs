use crate::appliers::{firewall_payload, ApplyContext, Applier};
use crate::errors::{NetStageError, Result};
use crate::host::commands;
use crate::model::{ChangeAction, ChangeType, PendingChange};

/// INPUT-chain rules via `iptables -A/-D`
///
/// Appends are not deduplicated: staging the same rule twice yields two
/// rules, as iptables itself would.
pub struct FirewallApplier;

impl Applier for FirewallApplier {
    fn change_type(&self) -> ChangeType {
        ChangeType::Firewall
    }

    fn apply(&self, change: &PendingChange, ctx: &ApplyContext<'_>) -> Result<()> {
        let rule = firewall_payload(change)?;
        let match_args = rule.match_args();

        match change.action {
            ChangeAction::Create => {
                ctx.run(commands::iptables_append_input(&match_args))?;
            }
            ChangeAction::Delete => {
                // iptables matches by meaning; its -S text is reordered and normalized
                match ctx.run(commands::iptables_delete_input(&match_args)) {
                    Ok(_) => {}
                    Err(NetStageError::HostCommandFailed { ref stderr, .. })
                        if is_missing_rule(stderr) =>
                    {
                        tracing::debug!(rule = %match_args.join(" "), "firewall rule already absent");
                    }
                    Err(err) => return Err(err),
                }
            }
            ChangeAction::Update => {
                return Err(NetStageError::UnsupportedAction {
                    change_type: ChangeType::Firewall,
                    action: ChangeAction::Update,
                    hint: "stage a delete of the old rule and a create of the new one"
                        .to_string(),
                })
            }
        }
        Ok(())
    }
}

fn is_missing_rule(stderr: &str) -> bool {
    stderr.contains("does a matching rule exist")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appliers::test_support::change;
    use crate::config::HostFiles;
    use crate::host::SimulatedHost;
    use crate::model::{ChangeConfig, FirewallRule};

    fn drop_ssh() -> ChangeConfig {
        ChangeConfig::Firewall(FirewallRule {
            action: "DROP".into(),
            protocol: Some("tcp".into()),
            source: Some("10.0.0.0/8".into()),
            destination: None,
        })
    }

    #[test]
    fn test_append_is_not_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new();
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());

        for _ in 0..2 {
            FirewallApplier
                .apply(&change(ChangeAction::Create, "block-ten", drop_ssh()), &ctx)
                .unwrap();
        }
        assert_eq!(
            host.input_rules(),
            vec![
                "-A INPUT -s 10.0.0.0/8 -p tcp -j DROP",
                "-A INPUT -s 10.0.0.0/8 -p tcp -j DROP"
            ]
        );
        assert_eq!(
            host.mutations()[0].to_string(),
            "iptables -A INPUT -p tcp -s 10.0.0.0/8 -j DROP"
        );
    }

    #[test]
    fn test_delete_tolerates_absent_rule() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new().with_input_rule("-A INPUT -s 10.0.0.0/8 -p tcp -j DROP");
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());

        FirewallApplier
            .apply(&change(ChangeAction::Delete, "block-ten", drop_ssh()), &ctx)
            .unwrap();
        assert!(host.input_rules().is_empty());

        // Second delete reaches iptables, which reports the rule missing
        FirewallApplier
            .apply(&change(ChangeAction::Delete, "block-ten", drop_ssh()), &ctx)
            .unwrap();
        assert_eq!(host.mutations().len(), 2);
    }

    #[test]
    fn test_delete_matches_rule_listed_in_iptables_order() {
        // Given a rule as iptables -S prints it: source before protocol, host with /32
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new()
            .with_input_rule("-A INPUT -s 10.0.0.0/8 -d 192.168.1.7/32 -p tcp -j DROP");
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());
        let rule = ChangeConfig::Firewall(FirewallRule {
            action: "DROP".into(),
            protocol: Some("tcp".into()),
            source: Some("10.0.0.0/8".into()),
            destination: Some("192.168.1.7".into()),
        });

        // When the staged rule is deleted
        FirewallApplier
            .apply(&change(ChangeAction::Delete, "block-ten", rule), &ctx)
            .unwrap();

        // Then iptables -D was issued and the rule is gone
        assert!(host.input_rules().is_empty());
        assert_eq!(
            host.mutations()[0].to_string(),
            "iptables -D INPUT -p tcp -s 10.0.0.0/8 -d 192.168.1.7 -j DROP"
        );
    }

    #[test]
    fn test_delete_propagates_other_failures() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new().with_input_rule("-A INPUT -s 10.0.0.0/8 -p tcp -j DROP");
        host.fail_on("iptables -D");
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());

        let err = FirewallApplier
            .apply(&change(ChangeAction::Delete, "block-ten", drop_ssh()), &ctx)
            .unwrap_err();
        assert!(matches!(err, NetStageError::HostCommandFailed { .. }));
        assert_eq!(host.input_rules().len(), 1);
    }
}
