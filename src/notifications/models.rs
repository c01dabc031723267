use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Where and how audit events are posted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub body_template: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Deleted,
    DeletedAll,
    Transferred,
    Reinstalled,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::Created => "created",
            AuditAction::Deleted => "deleted",
            AuditAction::DeletedAll => "deleted_all",
            AuditAction::Transferred => "transferred",
            AuditAction::Reinstalled => "reinstalled",
        };
        f.write_str(name)
    }
}

/// One auditable change, flattened into template variables on send.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub vps_id: Option<String>,
    pub actor_id: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, vps_id: Option<&str>, actor_id: &str, detail: impl Into<String>) -> Self {
        Self {
            action,
            vps_id: vps_id.map(str::to_string),
            actor_id: actor_id.to_string(),
            detail: detail.into(),
            timestamp: Utc::now(),
        }
    }

    /// Human-readable one-liner, exposed to templates as `message`.
    pub fn summary(&self) -> String {
        match &self.vps_id {
            Some(vps_id) => format!("VPS {vps_id} {} by <@{}>: {}", self.action, self.actor_id, self.detail),
            None => format!("VPS {} by <@{}>: {}", self.action, self.actor_id, self.detail),
        }
    }

    pub fn context(&self) -> HashMap<String, String> {
        HashMap::from([
            ("action".to_string(), self.action.to_string()),
            ("vps_id".to_string(), self.vps_id.clone().unwrap_or_default()),
            ("actor_id".to_string(), self.actor_id.clone()),
            ("detail".to_string(), self.detail.clone()),
            ("timestamp".to_string(), self.timestamp.to_rfc3339()),
            ("message".to_string(), self.summary()),
        ])
    }
}
