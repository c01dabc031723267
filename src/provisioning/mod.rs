//! Container lifecycle orchestration: the provisioning sequence and every
//! operation that mutates a VPS record.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::{StoreError, VpsStatus};
use crate::docker::RuntimeError;

pub mod credentials;
pub mod journal;
pub mod orchestrator;
pub mod package_lock;
pub mod retry;
pub mod session;
pub mod setup;

pub use journal::{ProvisionJournal, ProvisionKind, ProvisionStage, ProvisionTicket};
pub use orchestrator::{
    CreateRequest, NodeInfo, Orchestrator, OrchestratorSettings, SessionInfo, VerifiedListing,
    VerifiedVps,
};
pub use retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum VpsError {
    #[error("{0}")]
    Validation(String),
    #[error("User {owner_id} already has a VPS (limit {limit}). Delete the existing VPS first.")]
    AlreadyHasVps { owner_id: String, limit: usize },
    #[error("VPS not found: {0}")]
    NotFound(String),
    #[error("Image '{0}' is not in the list of installable images")]
    ImageNotAllowed(String),
    #[error("VPS is already {0}")]
    AlreadyInState(VpsStatus),
    #[error("Failed to get terminal session: {0}")]
    SessionUnavailable(String),
    #[error("Package manager is still locked after {attempts} attempts")]
    PackageLockHeld { attempts: u32 },
    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}

/// Receives human-readable progress while a long operation runs.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, message: &str);
}

/// Discards progress.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _message: &str) {}
}
