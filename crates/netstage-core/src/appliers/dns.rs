use crate::appliers::{dns_payload, ApplyContext, Applier};
use crate::errors::{NetStageError, Result};
use crate::files::{self, ResolvConf};
use crate::model::{ChangeAction, ChangeType, PendingChange};

/// Resolver configuration via a wholesale rewrite of resolv.conf
pub struct DnsApplier;

impl Applier for DnsApplier {
    fn change_type(&self) -> ChangeType {
        ChangeType::Dns
    }

    fn apply(&self, change: &PendingChange, ctx: &ApplyContext<'_>) -> Result<()> {
        if change.action == ChangeAction::Delete {
            return Err(NetStageError::UnsupportedAction {
                change_type: ChangeType::Dns,
                action: ChangeAction::Delete,
                hint: "stage an update with the desired nameservers".to_string(),
            });
        }
        let dns = dns_payload(change)?;
        let path = &ctx.files.resolv_conf;

        let current = files::read_optional(path)?;
        let mut conf = current.as_deref().map(ResolvConf::parse).unwrap_or_default();
        conf.apply(dns);
        let rendered = conf.render();

        if current.as_deref() == Some(rendered.as_str()) {
            tracing::debug!(file = %path.display(), "resolver already configured");
            return Ok(());
        }
        files::write_with_backup(path, &rendered, ctx.started_at)?;
        Ok(())
    }
}
