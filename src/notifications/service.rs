use std::sync::Arc;
use tracing::{debug, warn};

use super::models::{AuditEvent, WebhookConfig};
use super::senders::NotificationSender;
use super::senders::webhook::WebhookSender;
use crate::bot::config::BotConfig;

/// Body posted when no template is configured. Accepted by Discord webhooks.
pub const DEFAULT_BODY_TEMPLATE: &str = r#"{"content": {{ message | json_encode() | safe }}}"#;

/// Posts audit events in the background. Delivery failures are logged and
/// never reach the command that caused the event.
#[derive(Clone)]
pub struct AuditNotifier {
    sender: Arc<dyn NotificationSender>,
    config: Arc<WebhookConfig>,
}

impl AuditNotifier {
    pub fn new(sender: Arc<dyn NotificationSender>, config: WebhookConfig) -> Self {
        Self {
            sender,
            config: Arc::new(config),
        }
    }

    /// `None` when no webhook URL is configured.
    pub fn from_config(config: &BotConfig) -> Option<Self> {
        let url = config.audit_webhook_url.clone()?;
        let body_template = config
            .audit_webhook_template
            .clone()
            .unwrap_or_else(|| DEFAULT_BODY_TEMPLATE.to_string());
        Some(Self::new(
            Arc::new(WebhookSender::new()),
            WebhookConfig { url, body_template },
        ))
    }

    pub async fn send(&self, event: &AuditEvent) {
        match self.sender.send(&self.config, &event.context()).await {
            Ok(()) => debug!(action = %event.action, "Audit event delivered."),
            Err(e) => warn!(action = %event.action, error = %e, "Failed to deliver audit event."),
        }
    }

    pub fn notify(&self, event: AuditEvent) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.send(&event).await;
        });
    }
}
