//! Optional audit trail of VPS lifecycle events, posted to a webhook.

pub mod models;
pub mod senders;
pub mod service;

pub use models::{AuditAction, AuditEvent, WebhookConfig};
pub use service::AuditNotifier;
