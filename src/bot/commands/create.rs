use async_trait::async_trait;
use tracing::warn;

use super::{deliver_credentials, report_failure};
use crate::bot::command_dispatcher::{CommandContext, CommandError, CommandHandler, parse_mention};
use crate::bot::permissions::Access;
use crate::bot::presentation;
use crate::bot::progress::MessageProgress;
use crate::db::ResourceQuota;
use crate::notifications::{AuditAction, AuditEvent};
use crate::provisioning::CreateRequest;

pub struct CreateVps;

impl CreateVps {
    fn quota(&self, ctx: &CommandContext<'_>) -> Result<ResourceQuota, CommandError> {
        let number = |index: usize| -> Result<u32, CommandError> {
            ctx.arg(index, self.usage())?
                .parse()
                .map_err(|_| CommandError::Usage(self.usage().to_string()))
        };
        Ok(ResourceQuota {
            ram: number(0)?,
            cpu: number(1)?,
            disk: number(2)?,
        })
    }
}

#[async_trait]
impl CommandHandler for CreateVps {
    fn usage(&self) -> &'static str {
        "create_vps <ram_gb> <cpu> <disk_gb> [@owner]"
    }

    fn access(&self) -> Access {
        Access::Admin
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let quota = self.quota(ctx)?;
        let owner_id = match ctx.args.get(3) {
            Some(token) => {
                parse_mention(token).ok_or_else(|| CommandError::Usage(self.usage().to_string()))?
            }
            None => ctx.author_id().to_string(),
        };
        let owner_name = if owner_id == ctx.author_id() {
            ctx.message.author.name.clone()
        } else {
            match ctx.state.chat.user_name(&owner_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(owner_id = %owner_id, error = %e, "Owner lookup failed, deriving username from id.");
                    owner_id.clone()
                }
            }
        };

        let status = ctx.reply_text("🔄 Creating VPS... Please wait.").await?;
        let progress = MessageProgress::new(ctx.state.chat.as_ref(), status.clone());
        let request = CreateRequest {
            owner_id: owner_id.clone(),
            owner_name,
            quota,
            image: None,
        };
        let created = match ctx.state.orchestrator.create(request, &progress).await {
            Ok(created) => created,
            Err(e) => return report_failure(ctx, &status, e).await,
        };

        ctx.state.audit(AuditEvent::new(
            AuditAction::Created,
            Some(&created.record.id),
            ctx.author_id(),
            format!(
                "owner {owner_id}, {}GB RAM, {} CPU, {}GB disk, {}",
                quota.ram, quota.cpu, quota.disk, created.record.image
            ),
        ));

        let done = if owner_id == ctx.author_id() {
            "✅ VPS created successfully! Check your DMs for credentials.".to_string()
        } else {
            format!("✅ VPS created successfully! Credentials were sent to <@{owner_id}>.")
        };
        deliver_credentials(
            ctx,
            &status,
            &owner_id,
            presentation::created_embed(&created),
            &done,
        )
        .await
    }
}
