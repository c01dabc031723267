use async_trait::async_trait;
use reqwest::{Client, header};
use std::collections::HashMap;
use tera::{Context, Tera};

use super::{NotificationSender, SenderError};
use crate::notifications::models::WebhookConfig;
use crate::version::USER_AGENT;

/// Posts a JSON body rendered from the configured tera template.
pub struct WebhookSender {
    client: Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

pub fn render_body(template: &str, context: &HashMap<String, String>) -> Result<String, SenderError> {
    let mut tera_context = Context::new();
    for (key, value) in context {
        tera_context.insert(key, value);
    }
    Tera::one_off(template, &tera_context, true).map_err(|e| SenderError::TemplatingError(e.to_string()))
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &WebhookConfig,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let rendered_body = render_body(&config.body_template, context)?;

        let response = self
            .client
            .post(&config.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, USER_AGENT)
            .body(rendered_body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        Ok(())
    }
}
