use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use super::models::WebhookConfig;

pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Delivers a rendered notification to an external endpoint.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// `context` holds the template variables for the body.
    async fn send(
        &self,
        config: &WebhookConfig,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}
