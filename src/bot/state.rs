use std::sync::Arc;

use super::config::BotConfig;
use super::permissions;
use crate::chat::{ChatTransport, PendingConfirmations};
use crate::notifications::{AuditEvent, AuditNotifier};
use crate::provisioning::Orchestrator;

/// Shared by every event task.
pub struct AppState {
    pub config: Arc<BotConfig>,
    pub orchestrator: Arc<Orchestrator>,
    pub chat: Arc<dyn ChatTransport>,
    pub confirmations: PendingConfirmations,
    pub audit: Option<AuditNotifier>,
}

impl AppState {
    pub fn new(
        config: Arc<BotConfig>,
        orchestrator: Arc<Orchestrator>,
        chat: Arc<dyn ChatTransport>,
        audit: Option<AuditNotifier>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            chat,
            confirmations: PendingConfirmations::new(),
            audit,
        }
    }

    pub fn is_admin(&self, roles: &[String]) -> bool {
        permissions::is_admin(self.config.admin_role_id, roles)
    }

    pub fn audit(&self, event: AuditEvent) {
        if let Some(notifier) = &self.audit {
            notifier.notify(event);
        }
    }
}
