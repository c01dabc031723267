//! Chat platform boundary: outgoing message shapes, inbound events and the
//! transport trait the bot talks through.

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use thiserror::Error;

pub mod confirmations;
pub mod discord;

pub use confirmations::PendingConfirmations;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Discord API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Gateway error: {0}")]
    Gateway(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

pub const COLOR_BLUE: u32 = 0x3498db;
pub const COLOR_GREEN: u32 = 0x2ecc71;

/// Discord message flag for replies only the invoking user can see.
const EPHEMERAL_FLAG: u64 = 1 << 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: Some(title.into()),
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary = 1,
    Secondary = 2,
    Success = 3,
    Danger = 4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    Button {
        label: String,
        style: ButtonStyle,
        custom_id: String,
    },
    Select {
        custom_id: String,
        placeholder: String,
        options: Vec<SelectOption>,
    },
}

impl Component {
    fn to_json(&self) -> Value {
        match self {
            Component::Button {
                label,
                style,
                custom_id,
            } => json!({
                "type": 2,
                "label": label,
                "style": *style as u8,
                "custom_id": custom_id,
            }),
            Component::Select {
                custom_id,
                placeholder,
                options,
            } => {
                let options: Vec<Value> = options
                    .iter()
                    .map(|option| {
                        let mut value = json!({ "label": option.label, "value": option.value });
                        if let Some(description) = &option.description {
                            value["description"] = json!(description);
                        }
                        value
                    })
                    .collect();
                json!({
                    "type": 3,
                    "custom_id": custom_id,
                    "placeholder": placeholder,
                    "options": options,
                })
            }
        }
    }
}

/// One row of interactive components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRow {
    pub components: Vec<Component>,
}

impl Serialize for ActionRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let components: Vec<Value> = self.components.iter().map(Component::to_json).collect();
        json!({ "type": 1, "components": components }).serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ActionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Self::default()
        }
    }

    pub fn with_components(mut self, rows: Vec<ActionRow>) -> Self {
        self.components = rows;
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.flags = Some(EPHEMERAL_FLAG);
        self
    }

    pub fn is_ephemeral(&self) -> bool {
        self.flags.is_some_and(|flags| flags & EPHEMERAL_FLAG != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author: ChatUser,
    /// Role ids of the author in the guild. Empty in direct messages.
    pub author_roles: Vec<String>,
    pub content: String,
    pub mentions: Vec<ChatUser>,
}

/// What is needed to answer an interaction after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionToken {
    pub id: String,
    pub token: String,
    pub application_id: String,
}

/// A button press or select menu choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInteraction {
    pub token: InteractionToken,
    pub channel_id: Option<String>,
    pub user: ChatUser,
    pub roles: Vec<String>,
    pub custom_id: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Ready {
        user: ChatUser,
        application_id: String,
    },
    Message(IncomingMessage),
    Component(ComponentInteraction),
}

/// Receives every decoded gateway event. Each call runs on its own task.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ChatEvent);
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, ChatError>;

    async fn edit_message(
        &self,
        target: &MessageRef,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError>;

    /// Opens (or reuses) the DM channel with `user_id` and posts there.
    async fn send_direct(
        &self,
        user_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, ChatError>;

    async fn user_name(&self, user_id: &str) -> Result<String, ChatError>;

    /// Answers the interaction immediately with a message.
    async fn respond(
        &self,
        interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError>;

    /// Acknowledges the interaction; the answer follows later.
    async fn defer(&self, interaction: &InteractionToken, ephemeral: bool) -> Result<(), ChatError>;

    /// Replaces the deferred or original interaction response.
    async fn edit_original(
        &self,
        interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError>;

    async fn follow_up(
        &self,
        interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError>;
}
