use async_trait::async_trait;

use super::{deliver_credentials, report_failure};
use crate::bot::command_dispatcher::{CommandContext, CommandError, CommandHandler};
use crate::bot::presentation;
use crate::bot::progress::MessageProgress;
use crate::chat::OutgoingMessage;

/// Posts the management embed with its action buttons. Without an id the
/// author's first VPS is used.
pub struct ManageVps;

#[async_trait]
impl CommandHandler for ManageVps {
    fn usage(&self) -> &'static str {
        "manage_vps [vps_id]"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let orchestrator = &ctx.state.orchestrator;
        let record = match ctx.args.first() {
            Some(vps_id) => ctx.managed_record(vps_id).await?,
            None => match orchestrator.list_for_owner(ctx.author_id()).await?.into_iter().next() {
                Some(record) => record,
                None => {
                    ctx.reply_text(presentation::NO_VPS).await?;
                    return Ok(());
                }
            },
        };

        let verified = orchestrator.inspect(&record.id).await?;
        ctx.reply(presentation::manage_message(&verified.record, verified.state.as_ref()))
            .await?;
        Ok(())
    }
}

/// Opens a fresh terminal session and DMs it to the owner.
pub struct ConnectVps;

#[async_trait]
impl CommandHandler for ConnectVps {
    fn usage(&self) -> &'static str {
        "connect_vps <vps_id>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let record = ctx.managed_record(ctx.arg(0, self.usage())?).await?;

        let status = ctx.reply_text("🔄 Getting a new session...").await?;
        let progress = MessageProgress::new(ctx.state.chat.as_ref(), status.clone());
        let info = match ctx.state.orchestrator.refresh_session(&record.id, &progress).await {
            Ok(info) => info,
            Err(e) => return report_failure(ctx, &status, e).await,
        };

        let embed = presentation::session_embed(
            "New VPS Session",
            "Use the following command to connect:",
            &info,
        );
        deliver_credentials(
            ctx,
            &status,
            &record.owner_id,
            embed,
            "✅ New session sent to the owner's DMs!",
        )
        .await
    }
}

pub struct CheckRam;

#[async_trait]
impl CommandHandler for CheckRam {
    fn usage(&self) -> &'static str {
        "check_ram <vps_id>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let record = ctx.managed_record(ctx.arg(0, self.usage())?).await?;
        let usage = ctx.state.orchestrator.ram_usage(&record.id).await?;
        ctx.reply(OutgoingMessage::embed(presentation::ram_embed(&record.id, &usage)))
            .await?;
        Ok(())
    }
}
