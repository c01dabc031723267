use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{ResourceQuota, Store, StoreError, StoredRecord};

/// Steps of one provisioning run, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionStage {
    Requested,
    NetworkReady,
    ContainerCreated,
    Configured,
    SessionReady,
    Recorded,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisionStage::Requested => "requested",
            ProvisionStage::NetworkReady => "network-ready",
            ProvisionStage::ContainerCreated => "container-created",
            ProvisionStage::Configured => "configured",
            ProvisionStage::SessionReady => "session-ready",
            ProvisionStage::Recorded => "recorded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionKind {
    Create,
    Reinstall,
}

/// Journal entry for an in-flight creation or reinstall. Exists only while
/// the run is in progress; a ticket found at startup belongs to a run that
/// was interrupted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionTicket {
    pub vps_id: String,
    pub owner_id: String,
    pub kind: ProvisionKind,
    pub image: String,
    pub quota: ResourceQuota,
    pub stage: ProvisionStage,
    #[serde(default)]
    pub container_id: Option<String>,
    /// Container a reinstall replaces.
    #[serde(default)]
    pub previous_container_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord for ProvisionTicket {
    fn key(&self) -> &str {
        &self.vps_id
    }
}

impl ProvisionTicket {
    pub fn new(
        vps_id: &str,
        owner_id: &str,
        kind: ProvisionKind,
        image: &str,
        quota: ResourceQuota,
    ) -> Self {
        let now = Utc::now();
        Self {
            vps_id: vps_id.to_string(),
            owner_id: owner_id.to_string(),
            kind,
            image: image.to_string(),
            quota,
            stage: ProvisionStage::Requested,
            container_id: None,
            previous_container_id: None,
            started_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone)]
pub struct ProvisionJournal {
    store: Arc<dyn Store<ProvisionTicket>>,
}

impl ProvisionJournal {
    pub fn new(store: Arc<dyn Store<ProvisionTicket>>) -> Self {
        Self { store }
    }

    pub async fn begin(&self, ticket: &ProvisionTicket) -> Result<(), StoreError> {
        debug!(vps_id = %ticket.vps_id, kind = ?ticket.kind, "Provisioning started.");
        self.store.put(&ticket.vps_id, ticket.clone()).await
    }

    /// Moves the ticket forward and persists it. Backward moves are ignored.
    pub async fn advance(
        &self,
        ticket: &mut ProvisionTicket,
        stage: ProvisionStage,
    ) -> Result<(), StoreError> {
        if stage <= ticket.stage {
            warn!(vps_id = %ticket.vps_id, from = %ticket.stage, to = %stage, "Ignoring non-forward stage transition.");
            return Ok(());
        }
        debug!(vps_id = %ticket.vps_id, from = %ticket.stage, to = %stage, "Provisioning stage transition.");
        ticket.stage = stage;
        ticket.updated_at = Utc::now();
        self.store.put(&ticket.vps_id, ticket.clone()).await
    }

    pub async fn finish(&self, vps_id: &str) -> Result<(), StoreError> {
        self.store.delete(vps_id).await.map(|_| ())
    }

    pub async fn contains(&self, vps_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(vps_id).await?.is_some())
    }

    pub async fn pending(&self) -> Result<Vec<ProvisionTicket>, StoreError> {
        self.store.list().await
    }
}
