use async_trait::async_trait;

use crate::bot::command_dispatcher::{CommandContext, CommandError, CommandHandler};
use crate::bot::presentation;
use crate::chat::OutgoingMessage;

pub struct Help;

#[async_trait]
impl CommandHandler for Help {
    fn usage(&self) -> &'static str {
        "help"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let embed = presentation::help_embed(&ctx.state.config.command_prefix, ctx.is_admin);
        ctx.reply(OutgoingMessage::embed(embed)).await?;
        Ok(())
    }
}

pub struct Credits;

#[async_trait]
impl CommandHandler for Credits {
    fn usage(&self) -> &'static str {
        "credits"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        ctx.reply(OutgoingMessage::embed(presentation::credits_embed()))
            .await?;
        Ok(())
    }
}

pub struct Node;

#[async_trait]
impl CommandHandler for Node {
    fn usage(&self) -> &'static str {
        "node"
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError> {
        let info = ctx.state.orchestrator.node_info().await?;
        ctx.reply(OutgoingMessage::embed(presentation::node_embed(&info)))
            .await?;
        Ok(())
    }
}
