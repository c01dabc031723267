//! Progress sinks that surface provisioning steps in the chat.

use async_trait::async_trait;
use tracing::warn;

use crate::chat::{ChatTransport, InteractionToken, MessageRef, OutgoingMessage};
use crate::provisioning::ProgressSink;

/// Rewrites a status message in place.
pub struct MessageProgress<'a> {
    chat: &'a dyn ChatTransport,
    target: MessageRef,
}

impl<'a> MessageProgress<'a> {
    pub fn new(chat: &'a dyn ChatTransport, target: MessageRef) -> Self {
        Self { chat, target }
    }

    pub fn target(&self) -> &MessageRef {
        &self.target
    }
}

#[async_trait]
impl ProgressSink for MessageProgress<'_> {
    async fn report(&self, message: &str) {
        if let Err(e) = self
            .chat
            .edit_message(&self.target, &OutgoingMessage::text(message))
            .await
        {
            warn!(error = %e, "Failed to update status message.");
        }
    }
}

/// Rewrites the deferred response of an interaction.
pub struct InteractionProgress<'a> {
    chat: &'a dyn ChatTransport,
    token: &'a InteractionToken,
}

impl<'a> InteractionProgress<'a> {
    pub fn new(chat: &'a dyn ChatTransport, token: &'a InteractionToken) -> Self {
        Self { chat, token }
    }
}

#[async_trait]
impl ProgressSink for InteractionProgress<'_> {
    async fn report(&self, message: &str) {
        if let Err(e) = self
            .chat
            .edit_original(self.token, &OutgoingMessage::text(message).ephemeral())
            .await
        {
            warn!(error = %e, "Failed to update interaction response.");
        }
    }
}
