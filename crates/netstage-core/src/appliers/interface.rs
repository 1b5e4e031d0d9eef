use crate::appliers::{interface_payload, ApplyContext, Applier};
use crate::errors::Result;
use crate::host::{commands, introspect, run_checked, CommandRunner};
use crate::model::{AddressMethod, ChangeAction, ChangeType, InterfaceConfig, PendingChange};

/// Applies addressing, MTU and link state to an existing interface
pub struct InterfaceApplier;

impl Applier for InterfaceApplier {
    fn change_type(&self) -> ChangeType {
        ChangeType::Interface
    }

    fn apply(&self, change: &PendingChange, ctx: &ApplyContext<'_>) -> Result<()> {
        let name = change.resource_id.as_str();
        match change.action {
            ChangeAction::Create | ChangeAction::Update => {
                let cfg = interface_payload(change)?;
                configure_interface(ctx.runner, name, cfg, change.action == ChangeAction::Update)?;
                ctx.edit_interfaces(|file| file.upsert_interface(name, cfg))
            }
            // Only the persisted definition goes; live addressing stays until reload
            ChangeAction::Delete => ctx.edit_interfaces(|file| {
                file.remove_interface(name);
            }),
        }
    }
}

/// Bring a live interface in line with `cfg`
///
/// With `prune`, static addresses not named in `cfg` are removed.
///
/// # Errors
///
/// Returns `LinkNotFound` when the interface is absent, or the failing command.
pub fn configure_interface(
    runner: &dyn CommandRunner,
    name: &str,
    cfg: &InterfaceConfig,
    prune: bool,
) -> Result<()> {
    let links = introspect::link_table(runner)?;
    let link = introspect::require_link(&links, name)?;

    if let Some(mtu) = cfg.mtu {
        if link.mtu != mtu {
            run_checked(runner, &commands::link_set_mtu(name, mtu))?;
        }
    }
    if cfg.autostart && !link.up {
        run_checked(runner, &commands::link_set_up(name))?;
    }

    match cfg.effective_method() {
        AddressMethod::Static => {
            let wanted = cfg.addresses();
            let current = introspect::interface_addresses(runner, name)?;
            if prune {
                for stale in current.iter().filter(|a| !wanted.contains(&a.as_str())) {
                    run_checked(runner, &commands::addr_del(stale, name))?;
                }
            }
            for addr in wanted {
                if !current.iter().any(|a| a == addr) {
                    run_checked(runner, &commands::addr_add(addr, name))?;
                }
            }
            if let Some(gateway) = &cfg.gateway {
                if introspect::default_gateway(runner, name)?.as_ref() != Some(gateway) {
                    run_checked(runner, &commands::route_replace_default(gateway, name))?;
                }
            }
        }
        AddressMethod::Dhcp => {
            run_checked(runner, &commands::dhclient(name))?;
        }
        AddressMethod::Manual => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appliers::test_support::change;
    use crate::config::HostFiles;
    use crate::errors::NetStageError;
    use crate::host::SimulatedHost;
    use crate::model::ChangeConfig;

    fn static_cfg(addr: &str) -> InterfaceConfig {
        InterfaceConfig {
            ip_address: Some(addr.into()),
            mtu: Some(9000),
            ..InterfaceConfig::default()
        }
    }

    #[test]
    fn test_static_create_sets_address_and_mtu() {
        let host = SimulatedHost::new().with_link("eth1", &[]);
        configure_interface(&host, "eth1", &static_cfg("10.9.0.2/24"), false).unwrap();

        let link = host.link("eth1").unwrap();
        assert_eq!(link.addresses, vec!["10.9.0.2/24"]);
        assert_eq!(link.mtu, 9000);

        // Second run finds nothing to do
        let before = host.mutations().len();
        configure_interface(&host, "eth1", &static_cfg("10.9.0.2/24"), false).unwrap();
        assert_eq!(host.mutations().len(), before);
    }

    #[test]
    fn test_update_prunes_stale_address() {
        let host = SimulatedHost::new().with_link("eth1", &["10.9.0.2/24"]);
        configure_interface(&host, "eth1", &static_cfg("10.9.0.3/24"), true).unwrap();
        assert_eq!(host.link("eth1").unwrap().addresses, vec!["10.9.0.3/24"]);
    }

    #[test]
    fn test_dhcp_runs_client() {
        let host = SimulatedHost::new().with_link("eth1", &[]);
        configure_interface(&host, "eth1", &InterfaceConfig::default(), false).unwrap();
        assert_eq!(host.mutations().last().unwrap().to_string(), "dhclient eth1");
    }

    #[test]
    fn test_missing_interface_fails() {
        let host = SimulatedHost::new();
        let err = configure_interface(&host, "eth7", &InterfaceConfig::default(), false).unwrap_err();
        assert!(matches!(err, NetStageError::LinkNotFound { .. }));
    }

    #[test]
    fn test_delete_only_touches_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        std::fs::write(&files.interfaces, "auto eth1\niface eth1 inet static\n        address 10.9.0.2/24\n").unwrap();
        let host = SimulatedHost::new().with_link("eth1", &["10.9.0.2/24"]);
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());

        let delete = change(
            ChangeAction::Delete,
            "eth1",
            ChangeConfig::Interface(InterfaceConfig::default()),
        );
        InterfaceApplier.apply(&delete, &ctx).unwrap();

        assert!(host.mutations().is_empty());
        assert!(!std::fs::read_to_string(&files.interfaces).unwrap().contains("eth1"));
        assert_eq!(host.link("eth1").unwrap().addresses, vec!["10.9.0.2/24"]);
    }
}
