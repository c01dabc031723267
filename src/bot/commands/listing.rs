use async_trait::async_trait;
use tracing::{debug, info};

use crate::bot::command_dispatcher::{CommandContext, CommandError, CommandHandler};
use crate::bot::permissions::Access;
use crate::bot::presentation;
use crate::chat::OutgoingMessage;

/// Falls back to the raw id when the user cannot be looked up.
async fn display_name(ctx: &CommandContext<'_>, user_id: &str) -> String {
    match ctx.state.chat.user_name(user_id).await {
        Ok(name) => name,
        Err(e) => {
            debug!(user_id = %user_id, error = %e, "User lookup failed.");
            format!("Unknown User ({user_id})")
        }
    }
}

pub struct List;

#[async_trait]
impl CommandHandler for List {
    fn usage(&self) -> &'static str {
        "list"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let orchestrator = &ctx.state.orchestrator;
        if ctx.is_admin {
            let records = orchestrator.list_all().await?;
            if records.is_empty() {
                ctx.reply_text("No VPS instances found.").await?;
                return Ok(());
            }
            let mut entries = Vec::with_capacity(records.len());
            for record in records {
                let owner = display_name(ctx, &record.owner_id).await;
                entries.push((record, owner));
            }
            ctx.reply(OutgoingMessage::embed(presentation::admin_list_embed(&entries)))
                .await?;
            return Ok(());
        }

        let records = orchestrator.list_for_owner(ctx.author_id()).await?;
        if records.is_empty() {
            ctx.reply_text(presentation::NO_VPS).await?;
            return Ok(());
        }
        ctx.reply(OutgoingMessage::embed(presentation::owner_list_embed(&records)))
            .await?;
        Ok(())
    }
}

/// Admin listing checked against the runtime. Records whose container is
/// gone are pruned.
pub struct VpsList;

#[async_trait]
impl CommandHandler for VpsList {
    fn usage(&self) -> &'static str {
        "vps_list"
    }

    fn access(&self) -> Access {
        Access::Admin
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let listing = ctx.state.orchestrator.list_verified().await?;
        if !listing.pruned.is_empty() {
            info!(pruned = ?listing.pruned, "Pruned stale VPS records.");
        }
        if listing.entries.is_empty() {
            ctx.reply_text("No valid VPS instances found.").await?;
            return Ok(());
        }

        let mut owners = Vec::with_capacity(listing.entries.len());
        for entry in &listing.entries {
            owners.push(display_name(ctx, &entry.record.owner_id).await);
        }
        ctx.reply(OutgoingMessage::embed(presentation::verified_list_embed(
            &listing, &owners,
        )))
        .await?;
        Ok(())
    }
}
