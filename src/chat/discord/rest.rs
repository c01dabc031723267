use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Method, StatusCode, header};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use super::API_BASE;
use crate::chat::{ChatError, ChatTransport, InteractionToken, MessageRef, OutgoingMessage};
use crate::version::USER_AGENT;

const RATE_LIMIT_RETRIES: u32 = 3;

const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
const CALLBACK_DEFERRED_CHANNEL_MESSAGE: u8 = 5;

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
    channel_id: String,
}

#[derive(Deserialize)]
struct Channel {
    id: String,
}

#[derive(Deserialize)]
struct User {
    username: String,
}

#[derive(Deserialize)]
struct RateLimited {
    retry_after: f64,
}

/// REST v10 client authenticated as the bot.
pub struct DiscordRest {
    client: Client,
    token: String,
    base: String,
    dm_channels: DashMap<String, String>,
}

impl DiscordRest {
    pub fn new(token: &str) -> Result<Self, ChatError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            token: token.to_string(),
            base: API_BASE.to_string(),
            dm_channels: DashMap::new(),
        })
    }

    /// Sends one request, sleeping through rate limits. Returns the decoded
    /// body, or `None` for empty responses.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Option<Value>, ChatError> {
        let url = format!("{}{}", self.base, path);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header(header::AUTHORIZATION, format!("Bot {}", self.token));
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt <= RATE_LIMIT_RETRIES {
                let wait = response
                    .json::<RateLimited>()
                    .await
                    .map(|limit| limit.retry_after)
                    .unwrap_or(1.0);
                warn!(path = %path, retry_after = wait, attempt, "Rate limited by Discord, waiting.");
                tokio::time::sleep(Duration::from_secs_f64(wait.max(0.0))).await;
                continue;
            }

            if status == StatusCode::UNAUTHORIZED {
                return Err(ChatError::AuthenticationFailed(
                    "Discord rejected the bot token".to_string(),
                ));
            }

            if !status.is_success() {
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Failed to read error body".to_string());
                return Err(ChatError::Api {
                    status: status.as_u16(),
                    body: error_body,
                });
            }

            let text = response.text().await?;
            debug!(method = %method, path = %path, status = %status, "Discord request completed.");
            if text.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_str(&text)?));
        }
    }

    async fn request_as<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ChatError> {
        let value = self.request(method, path, body).await?.unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    async fn dm_channel(&self, user_id: &str) -> Result<String, ChatError> {
        if let Some(channel) = self.dm_channels.get(user_id) {
            return Ok(channel.clone());
        }
        let channel: Channel = self
            .request_as(
                Method::POST,
                "/users/@me/channels",
                Some(json!({ "recipient_id": user_id })),
            )
            .await?;
        self.dm_channels.insert(user_id.to_string(), channel.id.clone());
        Ok(channel.id)
    }
}

fn interaction_callback(kind: u8, data: Value) -> Value {
    json!({ "type": kind, "data": data })
}

#[async_trait]
impl ChatTransport for DiscordRest {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, ChatError> {
        let created: CreatedMessage = self
            .request_as(
                Method::POST,
                &format!("/channels/{channel_id}/messages"),
                Some(serde_json::to_value(message)?),
            )
            .await?;
        Ok(MessageRef {
            channel_id: created.channel_id,
            message_id: created.id,
        })
    }

    async fn edit_message(
        &self,
        target: &MessageRef,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.request(
            Method::PATCH,
            &format!("/channels/{}/messages/{}", target.channel_id, target.message_id),
            Some(serde_json::to_value(message)?),
        )
        .await?;
        Ok(())
    }

    async fn send_direct(
        &self,
        user_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, ChatError> {
        let channel_id = self.dm_channel(user_id).await?;
        self.send_message(&channel_id, message).await
    }

    async fn user_name(&self, user_id: &str) -> Result<String, ChatError> {
        let user: User = self
            .request_as(Method::GET, &format!("/users/{user_id}"), None)
            .await?;
        Ok(user.username)
    }

    async fn respond(
        &self,
        interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        let body = interaction_callback(CALLBACK_CHANNEL_MESSAGE, serde_json::to_value(message)?);
        self.request(
            Method::POST,
            &format!("/interactions/{}/{}/callback", interaction.id, interaction.token),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn defer(&self, interaction: &InteractionToken, ephemeral: bool) -> Result<(), ChatError> {
        let data = if ephemeral {
            json!({ "flags": 64 })
        } else {
            json!({})
        };
        self.request(
            Method::POST,
            &format!("/interactions/{}/{}/callback", interaction.id, interaction.token),
            Some(interaction_callback(CALLBACK_DEFERRED_CHANNEL_MESSAGE, data)),
        )
        .await?;
        Ok(())
    }

    async fn edit_original(
        &self,
        interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.request(
            Method::PATCH,
            &format!(
                "/webhooks/{}/{}/messages/@original",
                interaction.application_id, interaction.token
            ),
            Some(serde_json::to_value(message)?),
        )
        .await?;
        Ok(())
    }

    async fn follow_up(
        &self,
        interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.request(
            Method::POST,
            &format!("/webhooks/{}/{}", interaction.application_id, interaction.token),
            Some(serde_json::to_value(message)?),
        )
        .await?;
        Ok(())
    }
}
