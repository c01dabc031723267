use async_trait::async_trait;

use super::{deliver_credentials, report_failure};
use crate::bot::command_dispatcher::{CommandContext, CommandError, CommandHandler};
use crate::bot::presentation;
use crate::bot::progress::MessageProgress;
use crate::notifications::{AuditAction, AuditEvent};

pub struct StartVps;

#[async_trait]
impl CommandHandler for StartVps {
    fn usage(&self) -> &'static str {
        "start_vps <vps_id>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let record = ctx.managed_record(ctx.arg(0, self.usage())?).await?;

        let status = ctx.reply_text("🔄 Starting VPS...").await?;
        let progress = MessageProgress::new(ctx.state.chat.as_ref(), status.clone());
        let info = match ctx.state.orchestrator.start(&record.id, &progress).await {
            Ok(info) => info,
            Err(e) => return report_failure(ctx, &status, e).await,
        };

        let embed = presentation::session_embed(
            "🚀 VPS Started Successfully!",
            "Your VPS is now running. Use the following command to connect:",
            &info,
        );
        deliver_credentials(
            ctx,
            &status,
            &record.owner_id,
            embed,
            "✅ VPS started! Connection details were sent via DM.",
        )
        .await
    }
}

pub struct StopVps;

#[async_trait]
impl CommandHandler for StopVps {
    fn usage(&self) -> &'static str {
        "stop_vps <vps_id>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let record = ctx.managed_record(ctx.arg(0, self.usage())?).await?;
        ctx.state.orchestrator.stop(&record.id).await?;
        ctx.reply_text(format!("✅ VPS {} stopped successfully!", record.id))
            .await?;
        Ok(())
    }
}

pub struct RestartVps;

#[async_trait]
impl CommandHandler for RestartVps {
    fn usage(&self) -> &'static str {
        "restart_vps <vps_id>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let record = ctx.managed_record(ctx.arg(0, self.usage())?).await?;

        let status = ctx.reply_text("🔄 Restarting VPS...").await?;
        let progress = MessageProgress::new(ctx.state.chat.as_ref(), status.clone());
        let info = match ctx.state.orchestrator.restart(&record.id, &progress).await {
            Ok(info) => info,
            Err(e) => return report_failure(ctx, &status, e).await,
        };

        let embed = presentation::session_embed(
            "🔄 VPS Restarted Successfully!",
            "Your VPS has been restarted. Use the following command to connect:",
            &info,
        );
        deliver_credentials(
            ctx,
            &status,
            &record.owner_id,
            embed,
            "✅ VPS restarted! Connection details were sent via DM.",
        )
        .await
    }
}

/// Rebuilds the VPS from another allowed image, keeping its credentials.
pub struct ReinstallVps;

#[async_trait]
impl CommandHandler for ReinstallVps {
    fn usage(&self) -> &'static str {
        "reinstall_vps <vps_id> <image>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let vps_id = ctx.arg(0, self.usage())?;
        let image = ctx.arg(1, self.usage())?;
        let record = ctx.managed_record(vps_id).await?;

        let status = ctx
            .reply_text(format!("🔄 Reinstalling VPS {} with {image}...", record.id))
            .await?;
        let progress = MessageProgress::new(ctx.state.chat.as_ref(), status.clone());
        let info = match ctx.state.orchestrator.reinstall(&record.id, image, &progress).await {
            Ok(info) => info,
            Err(e) => return report_failure(ctx, &status, e).await,
        };

        ctx.state.audit(AuditEvent::new(
            AuditAction::Reinstalled,
            Some(&record.id),
            ctx.author_id(),
            format!("{} -> {image}", record.image),
        ));
        let embed = presentation::session_embed(
            "✅ VPS Reinstalled Successfully!",
            &format!("Your VPS now runs {image}. Use the following command to connect:"),
            &info,
        );
        deliver_credentials(
            ctx,
            &status,
            &record.owner_id,
            embed,
            "✅ VPS reinstalled! Connection details were sent via DM.",
        )
        .await
    }
}
