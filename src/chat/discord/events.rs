//! Gateway payload shapes and their conversion into [`ChatEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatEvent, ChatUser, ComponentInteraction, IncomingMessage, InteractionToken};

pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

const INTERACTION_MESSAGE_COMPONENT: u8 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

impl From<RawUser> for ChatUser {
    fn from(raw: RawUser) -> Self {
        ChatUser {
            id: raw.id,
            name: raw.username,
            bot: raw.bot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawApplication {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawReady {
    user: RawUser,
    application: RawApplication,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: RawUser,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    mentions: Vec<RawUser>,
}

#[derive(Debug, Default, Deserialize)]
struct RawComponentData {
    #[serde(default)]
    custom_id: String,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawInteraction {
    id: String,
    application_id: String,
    #[serde(rename = "type")]
    kind: u8,
    token: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    member: Option<RawMember>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    data: Option<RawComponentData>,
}

/// Decodes a dispatch payload. Events the bot does not handle, and
/// interactions other than component presses, yield `None`.
pub fn decode_dispatch(event: &str, data: Value) -> Result<Option<ChatEvent>, serde_json::Error> {
    match event {
        "READY" => {
            let ready: RawReady = serde_json::from_value(data)?;
            Ok(Some(ChatEvent::Ready {
                user: ready.user.into(),
                application_id: ready.application.id,
            }))
        }
        "MESSAGE_CREATE" => {
            let raw: RawMessage = serde_json::from_value(data)?;
            Ok(Some(ChatEvent::Message(IncomingMessage {
                id: raw.id,
                channel_id: raw.channel_id,
                guild_id: raw.guild_id,
                author: raw.author.into(),
                author_roles: raw.member.map(|m| m.roles).unwrap_or_default(),
                content: raw.content,
                mentions: raw.mentions.into_iter().map(ChatUser::from).collect(),
            })))
        }
        "INTERACTION_CREATE" => {
            let raw: RawInteraction = serde_json::from_value(data)?;
            if raw.kind != INTERACTION_MESSAGE_COMPONENT {
                return Ok(None);
            }
            // Guild interactions carry the user inside `member`.
            let (user, roles) = match (raw.member, raw.user) {
                (Some(RawMember { roles, user: Some(user) }), _) => (user, roles),
                (_, Some(user)) => (user, Vec::new()),
                _ => return Ok(None),
            };
            let data = raw.data.unwrap_or_default();
            Ok(Some(ChatEvent::Component(ComponentInteraction {
                token: InteractionToken {
                    id: raw.id,
                    token: raw.token,
                    application_id: raw.application_id,
                },
                channel_id: raw.channel_id,
                user: user.into(),
                roles,
                custom_id: data.custom_id,
                values: data.values,
            })))
        }
        _ => Ok(None),
    }
}
