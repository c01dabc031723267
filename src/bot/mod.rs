//! The chat-facing side of the deployer: commands, buttons and what they
//! render.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::chat::{ChatEvent, EventHandler};

pub mod command_dispatcher;
pub mod commands;
pub mod config;
pub mod interactions;
pub mod permissions;
pub mod presentation;
pub mod progress;
pub mod state;

use command_dispatcher::CommandDispatcher;
use state::AppState;

/// Routes gateway events to the command dispatcher or the component
/// handler.
pub struct Bot {
    state: Arc<AppState>,
    dispatcher: CommandDispatcher,
}

impl Bot {
    pub fn new(state: Arc<AppState>) -> Self {
        let dispatcher = commands::dispatcher(&state.config.command_prefix);
        Self { state, dispatcher }
    }
}

#[async_trait]
impl EventHandler for Bot {
    async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Ready {
                user,
                application_id,
            } => {
                info!(bot = %user.name, bot_id = %user.id, application_id = %application_id, prefix = %self.dispatcher.prefix(), "Bot is ready.");
            }
            ChatEvent::Message(message) => self.dispatcher.dispatch(&self.state, &message).await,
            ChatEvent::Component(interaction) => {
                interactions::handle_component(&self.state, &interaction).await
            }
        }
    }
}
