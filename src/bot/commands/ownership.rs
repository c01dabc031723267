use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::bot::command_dispatcher::{CommandContext, CommandError, CommandHandler, parse_mention};
use crate::bot::permissions::Access;
use crate::bot::presentation;
use crate::notifications::{AuditAction, AuditEvent};

const DELETE_ALL_CONFIRMATION: &str = "yes";
const DELETE_ALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TransferVps;

#[async_trait]
impl CommandHandler for TransferVps {
    fn usage(&self) -> &'static str {
        "transfer_vps <vps_id> <@user>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let vps_id = ctx.arg(0, self.usage())?;
        let new_owner = parse_mention(ctx.arg(1, self.usage())?)
            .ok_or_else(|| CommandError::Usage(self.usage().to_string()))?;
        let record = ctx.managed_record(vps_id).await?;

        let transferred = ctx.state.orchestrator.transfer(&record.id, &new_owner).await?;
        ctx.state.audit(AuditEvent::new(
            AuditAction::Transferred,
            Some(&transferred.id),
            ctx.author_id(),
            format!("{} -> {}", record.owner_id, transferred.owner_id),
        ));
        ctx.reply_text(format!(
            "✅ VPS {} has been transferred to <@{new_owner}>.",
            transferred.id
        ))
        .await?;
        Ok(())
    }
}

pub struct DeleteVps;

#[async_trait]
impl CommandHandler for DeleteVps {
    fn usage(&self) -> &'static str {
        "delete_vps <vps_id>"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let record = ctx.managed_record(ctx.arg(0, self.usage())?).await?;
        let deleted = ctx.state.orchestrator.delete(&record.id).await?;
        ctx.state.audit(AuditEvent::new(
            AuditAction::Deleted,
            Some(&deleted.id),
            ctx.author_id(),
            format!("owner {}", deleted.owner_id),
        ));
        ctx.reply_text(format!("✅ VPS {} has been deleted!", deleted.id))
            .await?;
        Ok(())
    }
}

/// Removes every VPS after the author types the confirmation word in the
/// same channel within `timeout`.
pub struct DeleteAll {
    pub timeout: Duration,
}

impl Default for DeleteAll {
    fn default() -> Self {
        Self {
            timeout: DELETE_ALL_TIMEOUT,
        }
    }
}

#[async_trait]
impl CommandHandler for DeleteAll {
    fn usage(&self) -> &'static str {
        "delete_all"
    }

    fn access(&self) -> Access {
        Access::Admin
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        ctx.reply(presentation::delete_all_prompt()).await?;
        let confirmed = ctx
            .state
            .confirmations
            .wait_for(
                &ctx.message.channel_id,
                ctx.author_id(),
                DELETE_ALL_CONFIRMATION,
                self.timeout,
            )
            .await;
        if !confirmed {
            info!(author = %ctx.author_id(), "Delete-all was not confirmed.");
            ctx.reply_text("❌ Operation cancelled - no confirmation received.")
                .await?;
            return Ok(());
        }

        let deleted = ctx.state.orchestrator.delete_all().await?;
        ctx.state.audit(AuditEvent::new(
            AuditAction::DeletedAll,
            None,
            ctx.author_id(),
            format!("{deleted} instance(s)"),
        ));
        ctx.reply_text(format!("✅ Successfully deleted {deleted} VPS instances!"))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::command_dispatcher::CommandDispatcher;
    use crate::bot::commands::dispatcher;
    use crate::testing::TestBot;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_transfer_changes_owner_only() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        let vps_id = bot.create_for("1001").await;
        let before = bot.state.orchestrator.get(&vps_id).await.unwrap();

        dispatcher
            .dispatch(
                &bot.state,
                &bot.message("1001", &format!("!transfer_vps {vps_id} <@!2002>"), false),
            )
            .await;

        let after = bot.state.orchestrator.get(&vps_id).await.unwrap();
        assert_eq!(after.owner_id, "2002");
        assert_eq!(after.container_id, before.container_id);
        assert_eq!(after.password, before.password);
        assert_eq!(
            bot.chat.sent(),
            vec![format!("✅ VPS {vps_id} has been transferred to <@2002>.")]
        );
    }

    #[tokio::test]
    async fn test_transfer_needs_a_mention() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        let vps_id = bot.create_for("1001").await;
        dispatcher
            .dispatch(
                &bot.state,
                &bot.message("1001", &format!("!transfer_vps {vps_id} bob"), false),
            )
            .await;
        assert_eq!(
            bot.chat.sent(),
            vec!["❌ Usage: `!transfer_vps <vps_id> <@user>`".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_then_manage_reports_not_found() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        let vps_id = bot.create_for("1001").await;

        dispatcher
            .dispatch(&bot.state, &bot.message("1001", &format!("!delete_vps {vps_id}"), false))
            .await;
        dispatcher
            .dispatch(&bot.state, &bot.message("1001", &format!("!manage_vps {vps_id}"), false))
            .await;
        assert_eq!(
            bot.chat.sent(),
            vec![
                format!("✅ VPS {vps_id} has been deleted!"),
                "❌ VPS not found!".to_string(),
            ]
        );
        assert_eq!(bot.runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_all_waits_for_yes() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        bot.create_for("1001").await;
        bot.create_for("2002").await;

        let prompt = presentation::delete_all_prompt().content.unwrap();
        let request = bot.message("9", "!delete_all", true);
        let confirm = async {
            while !bot.chat.sent().contains(&prompt) {
                tokio::task::yield_now().await;
            }
            // Someone else saying yes does not count.
            dispatcher
                .dispatch(&bot.state, &bot.message("2002", "yes", false))
                .await;
            dispatcher
                .dispatch(&bot.state, &bot.message("9", "Yes", true))
                .await;
        };
        tokio::join!(dispatcher.dispatch(&bot.state, &request), confirm);

        assert_eq!(
            bot.chat.sent().last().unwrap(),
            "✅ Successfully deleted 2 VPS instances!"
        );
        assert!(bot.state.orchestrator.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_times_out() {
        let bot = TestBot::new().await;
        let mut dispatcher = CommandDispatcher::new("!");
        dispatcher.register(
            &["delete_all"],
            Arc::new(DeleteAll {
                timeout: Duration::from_millis(20),
            }),
        );
        bot.create_for("1001").await;

        dispatcher
            .dispatch(&bot.state, &bot.message("9", "!delete_all", true))
            .await;
        assert_eq!(
            bot.chat.sent().last().unwrap(),
            "❌ Operation cancelled - no confirmation received."
        );
        assert_eq!(bot.state.orchestrator.list_all().await.unwrap().len(), 1);
    }
}
