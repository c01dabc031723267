//! Chat command handlers and their registration.

use std::sync::Arc;
use tracing::warn;

use super::command_dispatcher::{CommandContext, CommandDispatcher, CommandError};
use super::presentation;
use crate::chat::{Embed, MessageRef, OutgoingMessage};
use crate::provisioning::VpsError;

mod create;
mod info;
mod lifecycle;
mod listing;
mod manage;
mod ownership;

const DM_FAILED: &str = "❌ Could not send credentials via DM. Please enable DMs from server members.";

/// A dispatcher with every command registered.
pub fn dispatcher(prefix: &str) -> CommandDispatcher {
    let mut dispatcher = CommandDispatcher::new(prefix);
    dispatcher.register(&["help", "commands"], Arc::new(info::Help));
    dispatcher.register(&["credits"], Arc::new(info::Credits));
    dispatcher.register(&["node"], Arc::new(info::Node));
    dispatcher.register(&["list"], Arc::new(listing::List));
    dispatcher.register(&["vps_list"], Arc::new(listing::VpsList));
    dispatcher.register(&["create_vps"], Arc::new(create::CreateVps));
    dispatcher.register(&["manage_vps"], Arc::new(manage::ManageVps));
    dispatcher.register(&["connect_vps"], Arc::new(manage::ConnectVps));
    dispatcher.register(&["check_ram"], Arc::new(manage::CheckRam));
    dispatcher.register(&["start_vps"], Arc::new(lifecycle::StartVps));
    dispatcher.register(&["stop_vps"], Arc::new(lifecycle::StopVps));
    dispatcher.register(&["restart_vps"], Arc::new(lifecycle::RestartVps));
    dispatcher.register(&["reinstall_vps"], Arc::new(lifecycle::ReinstallVps));
    dispatcher.register(&["transfer_vps"], Arc::new(ownership::TransferVps));
    dispatcher.register(&["delete_vps"], Arc::new(ownership::DeleteVps));
    dispatcher.register(&["delete_all"], Arc::new(ownership::DeleteAll::default()));
    dispatcher
}

async fn edit_status(ctx: &CommandContext<'_>, status: &MessageRef, text: &str) -> Result<(), CommandError> {
    ctx.state
        .chat
        .edit_message(status, &OutgoingMessage::text(text))
        .await?;
    Ok(())
}

/// Replaces the status message with the rendered failure.
async fn report_failure(
    ctx: &CommandContext<'_>,
    status: &MessageRef,
    error: VpsError,
) -> Result<(), CommandError> {
    warn!(author = %ctx.author_id(), error = %error, "VPS operation failed.");
    edit_status(ctx, status, &presentation::vps_error_text(&error)).await
}

/// DMs `embed` to `user_id` and settles the status message either way.
async fn deliver_credentials(
    ctx: &CommandContext<'_>,
    status: &MessageRef,
    user_id: &str,
    embed: Embed,
    done: &str,
) -> Result<(), CommandError> {
    match ctx
        .state
        .chat
        .send_direct(user_id, &OutgoingMessage::embed(embed))
        .await
    {
        Ok(_) => edit_status(ctx, status, done).await,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Failed to DM credentials.");
            edit_status(ctx, status, DM_FAILED).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestBot;

    #[tokio::test]
    async fn test_all_commands_registered() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        dispatcher
            .dispatch(&bot.state, &bot.message("1001", "!commands", false))
            .await;
        dispatcher
            .dispatch(&bot.state, &bot.message("1001", "!credits", false))
            .await;
        dispatcher
            .dispatch(&bot.state, &bot.message("1001", "!node", false))
            .await;
        assert_eq!(
            bot.chat.sent(),
            vec![
                "Available Commands".to_string(),
                "VPS Deployer Bot".to_string(),
                "🖥️ Node Information".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_and_unprefixed_messages_are_ignored() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        dispatcher
            .dispatch(&bot.state, &bot.message("1001", "!does_not_exist", false))
            .await;
        dispatcher
            .dispatch(&bot.state, &bot.message("1001", "hello there", false))
            .await;
        assert!(bot.chat.sent().is_empty());
    }

    #[tokio::test]
    async fn test_bot_authors_are_ignored() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        let mut message = bot.message("1001", "!help", false);
        message.author.bot = true;
        dispatcher.dispatch(&bot.state, &message).await;
        assert!(bot.chat.sent().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_message_is_dropped() {
        let bot = TestBot::new().await;
        let dispatcher = dispatcher("!");
        let message = bot.message("1001", "!help", false);
        dispatcher.dispatch(&bot.state, &message).await;
        dispatcher.dispatch(&bot.state, &message).await;
        assert_eq!(bot.chat.sent().len(), 1);
    }
}
