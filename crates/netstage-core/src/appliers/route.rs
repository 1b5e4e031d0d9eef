use crate::appliers::{route_payload, ApplyContext, Applier};
use crate::errors::{NetStageError, Result};
use crate::host::{commands, introspect};
use crate::model::{ChangeAction, ChangeType, PendingChange};

/// Static routes via `ip route add/del`
pub struct RouteApplier;

impl Applier for RouteApplier {
    fn change_type(&self) -> ChangeType {
        ChangeType::Route
    }

    fn apply(&self, change: &PendingChange, ctx: &ApplyContext<'_>) -> Result<()> {
        let route = route_payload(change)?;
        let existing = introspect::routes(ctx.runner)?;

        match change.action {
            ChangeAction::Create => {
                let present = existing.iter().any(|r| {
                    r.destination == route.destination
                        && r.via.as_deref() == Some(route.gateway.as_str())
                        && r.dev.as_deref() == Some(route.interface.as_str())
                });
                if present {
                    tracing::debug!(destination = %route.destination, "route already present");
                    return Ok(());
                }
                ctx.run(commands::route_add(
                    &route.destination,
                    &route.gateway,
                    &route.interface,
                ))?;
            }
            ChangeAction::Delete => {
                if !existing.iter().any(|r| r.destination == route.destination) {
                    tracing::debug!(destination = %route.destination, "route already absent");
                    return Ok(());
                }
                ctx.run(commands::route_del(&route.destination))?;
            }
            ChangeAction::Update => {
                return Err(NetStageError::UnsupportedAction {
                    change_type: ChangeType::Route,
                    action: ChangeAction::Update,
                    hint: "stage a delete followed by a create".to_string(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appliers::test_support::change;
    use crate::config::HostFiles;
    use crate::host::SimulatedHost;
    use crate::model::{ChangeConfig, RouteConfig};

    fn route() -> ChangeConfig {
        ChangeConfig::Route(RouteConfig {
            destination: "10.1.0.0/16".into(),
            gateway: "10.0.0.1".into(),
            interface: "eth0".into(),
        })
    }

    #[test]
    fn test_create_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new().with_link("eth0", &["10.0.0.5/24"]);
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());

        RouteApplier
            .apply(&change(ChangeAction::Create, "10.1.0.0/16", route()), &ctx)
            .unwrap();
        assert!(host
            .routes()
            .contains(&"10.1.0.0/16 via 10.0.0.1 dev eth0".to_string()));

        // Already present: no second add
        RouteApplier
            .apply(&change(ChangeAction::Create, "10.1.0.0/16", route()), &ctx)
            .unwrap();
        assert_eq!(host.mutations().len(), 1);

        RouteApplier
            .apply(&change(ChangeAction::Delete, "10.1.0.0/16", route()), &ctx)
            .unwrap();
        assert!(!host.routes().iter().any(|r| r.starts_with("10.1.0.0/16")));

        // Already absent: nothing issued
        RouteApplier
            .apply(&change(ChangeAction::Delete, "10.1.0.0/16", route()), &ctx)
            .unwrap();
        assert_eq!(host.mutations().len(), 2);
    }

    #[test]
    fn test_update_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let files = HostFiles::in_dir(dir.path());
        let host = SimulatedHost::new();
        let ctx = ApplyContext::new(&host, &files, chrono::Utc::now());

        let err = RouteApplier
            .apply(&change(ChangeAction::Update, "10.1.0.0/16", route()), &ctx)
            .unwrap_err();
        assert!(matches!(err, NetStageError::UnsupportedAction { .. }));
    }
}
