use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::credentials::{generate_password, generate_vps_id, login_name};
use super::journal::{ProvisionJournal, ProvisionKind, ProvisionStage, ProvisionTicket};
use super::package_lock::wait_for_package_lock;
use super::session::{SESSION_MARKER, capture_session_line, session_command};
use super::setup;
use super::{ProgressSink, RetryPolicy, VpsError};
use crate::bot::config::BotConfig;
use crate::db::{ResourceQuota, Store, VpsRecord, VpsStatus};
use crate::docker::{ContainerRuntime, ContainerSpec, ContainerState, ExecOutput, RuntimeError, shell};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Holds one key of a lock map. The entry is dropped from the map on release
/// once nobody else holds or waits for it.
struct KeyGuard<'a> {
    map: &'a LockMap,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> KeyGuard<'a> {
    async fn acquire(map: &'a LockMap, key: &str) -> Self {
        let lock = map.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        Self {
            map,
            key: key.to_string(),
            guard: Some(guard),
        }
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub network_name: String,
    pub brand_name: String,
    pub default_image: String,
    pub allowed_images: Vec<String>,
    pub min_memory_gb: u32,
    pub max_vps_per_user: usize,
    pub install_init_system: bool,
    pub boot_delay: Duration,
    pub exec_timeout: Duration,
    pub session_timeout: Duration,
    pub lock_policy: RetryPolicy,
}

impl From<&BotConfig> for OrchestratorSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            network_name: config.network_name.clone(),
            brand_name: config.brand_name.clone(),
            default_image: config.default_image.clone(),
            allowed_images: config.allowed_images.clone(),
            min_memory_gb: config.min_memory_gb,
            max_vps_per_user: config.max_vps_per_user,
            install_init_system: config.install_init_system,
            boot_delay: config.boot_delay(),
            exec_timeout: config.exec_timeout(),
            session_timeout: config.session_timeout(),
            lock_policy: RetryPolicy::new(config.lock_max_attempts, config.lock_retry_delay()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub owner_id: String,
    /// Display name the login username is derived from.
    pub owner_name: String,
    pub quota: ResourceQuota,
    /// Falls back to the configured default image.
    pub image: Option<String>,
}

/// A record together with a freshly captured terminal session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub record: VpsRecord,
    pub session: String,
}

#[derive(Debug, Clone)]
pub struct VerifiedVps {
    pub record: VpsRecord,
    /// `None` when the runtime could not be asked.
    pub state: Option<ContainerState>,
}

#[derive(Debug, Clone, Default)]
pub struct VerifiedListing {
    pub entries: Vec<VerifiedVps>,
    pub pruned: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub docker_version: String,
    pub network: String,
    pub total_vps: usize,
    pub running_vps: usize,
}

/// Drives the container runtime through provisioning and every other
/// record-mutating operation.
///
/// Operations on one record are serialized through a per-record lock.
/// Operations that depend on how many records an owner has (create,
/// transfer) additionally hold a per-owner lock, always taken before the
/// record lock.
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    records: Arc<dyn Store<VpsRecord>>,
    journal: ProvisionJournal,
    settings: OrchestratorSettings,
    record_locks: LockMap,
    owner_locks: LockMap,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        records: Arc<dyn Store<VpsRecord>>,
        journal: ProvisionJournal,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            runtime,
            records,
            journal,
            settings,
            record_locks: DashMap::new(),
            owner_locks: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    async fn lock_record(&self, vps_id: &str) -> KeyGuard<'_> {
        KeyGuard::acquire(&self.record_locks, vps_id).await
    }

    async fn lock_owner(&self, owner_id: &str) -> KeyGuard<'_> {
        KeyGuard::acquire(&self.owner_locks, owner_id).await
    }

    async fn require(&self, vps_id: &str) -> Result<VpsRecord, VpsError> {
        self.records
            .get(vps_id)
            .await?
            .ok_or_else(|| VpsError::NotFound(vps_id.to_string()))
    }

    fn validate_quota(&self, quota: &ResourceQuota) -> Result<(), VpsError> {
        if quota.ram < self.settings.min_memory_gb {
            return Err(VpsError::Validation(format!(
                "Minimum RAM requirement is {}GB",
                self.settings.min_memory_gb
            )));
        }
        if quota.cpu == 0 {
            return Err(VpsError::Validation(
                "At least 1 CPU core is required".to_string(),
            ));
        }
        if quota.disk == 0 {
            return Err(VpsError::Validation(
                "Disk size must be at least 1GB".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_image(&self, image: &str) -> Result<(), VpsError> {
        if self.settings.allowed_images.iter().any(|allowed| allowed == image) {
            Ok(())
        } else {
            Err(VpsError::ImageNotAllowed(image.to_string()))
        }
    }

    /// Caller must hold the owner lock.
    async fn ensure_below_limit(&self, owner_id: &str) -> Result<(), VpsError> {
        let owned = self
            .records
            .list()
            .await?
            .iter()
            .filter(|record| record.is_owned_by(owner_id))
            .count();
        if owned >= self.settings.max_vps_per_user {
            return Err(VpsError::AlreadyHasVps {
                owner_id: owner_id.to_string(),
                limit: self.settings.max_vps_per_user,
            });
        }
        Ok(())
    }

    async fn unused_vps_id(&self) -> Result<String, VpsError> {
        for _ in 0..16 {
            let candidate = generate_vps_id();
            if self.records.get(&candidate).await?.is_none()
                && !self.journal.contains(&candidate).await?
            {
                return Ok(candidate);
            }
        }
        Err(VpsError::Validation(
            "Could not allocate a unique VPS id".to_string(),
        ))
    }

    async fn exec_checked(&self, container_id: &str, script: String) -> Result<ExecOutput, RuntimeError> {
        let output = self
            .runtime
            .exec(container_id, &shell(script.clone()), self.settings.exec_timeout)
            .await?;
        if output.success() {
            return Ok(output);
        }
        let mut command: String = script.chars().take(60).collect();
        if script.len() > command.len() {
            command.push('…');
        }
        Err(RuntimeError::CommandFailed {
            command,
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }

    async fn ensure_network(&self) -> Result<(), RuntimeError> {
        let name = &self.settings.network_name;
        if !self.runtime.network_exists(name).await? {
            info!(network = %name, "Shared network missing, creating it.");
            self.runtime.create_network(name).await?;
        }
        Ok(())
    }

    /// Stops and removes a container. A container that no longer exists
    /// counts as removed.
    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        match self.runtime.stop(container_id).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => warn!(container_id = %container_id, error = %e, "Stop failed, forcing removal."),
        }
        match self.runtime.remove(container_id).await {
            Ok(()) | Err(RuntimeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Best-effort cleanup used on rollback paths.
    async fn discard_container(&self, container_id: &str) {
        match self.remove_container(container_id).await {
            Ok(()) => info!(container_id = %container_id, "Discarded container."),
            Err(e) => error!(container_id = %container_id, error = %e, "Failed to discard container, it may be orphaned."),
        }
    }

    async fn open_session(&self, container_id: &str) -> Result<String, VpsError> {
        self.runtime
            .exec(container_id, &shell(setup::KILL_SESSIONS), self.settings.exec_timeout)
            .await?;
        let stream = self
            .runtime
            .spawn_session(container_id, &session_command())
            .await?;
        let timeout = self.settings.session_timeout;
        match tokio::time::timeout(timeout, capture_session_line(stream, SESSION_MARKER)).await {
            Ok(Ok(Some(session))) => Ok(session),
            Ok(Ok(None)) => Err(VpsError::SessionUnavailable(
                "tmate exited without printing a session".to_string(),
            )),
            Ok(Err(e)) => Err(VpsError::SessionUnavailable(e.to_string())),
            Err(_) => Err(VpsError::SessionUnavailable(format!(
                "no session line within {} seconds",
                timeout.as_secs()
            ))),
        }
    }

    /// Makes sure tmate is present in an existing container and opens a
    /// fresh session.
    async fn prepare_session(
        &self,
        container_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<String, VpsError> {
        let check = self
            .runtime
            .exec(container_id, &shell("command -v tmate"), self.settings.exec_timeout)
            .await?;
        if !check.success() {
            progress.report("🔄 Installing tmate...").await;
            wait_for_package_lock(
                self.runtime.as_ref(),
                container_id,
                self.settings.lock_policy,
                self.settings.exec_timeout,
                progress,
            )
            .await?;
            self.exec_checked(container_id, setup::ensure_tmate_script())
                .await?;
        }
        progress.report("🔄 Setting up SSH access...").await;
        self.open_session(container_id).await
    }

    /// Runs network setup through session capture, journaling each stage.
    /// On failure the container created by this run is discarded and the
    /// ticket is closed.
    async fn provision_container(
        &self,
        ticket: &mut ProvisionTicket,
        container_name: &str,
        username: &str,
        password: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(String, String), VpsError> {
        match self
            .run_provisioning_steps(ticket, container_name, username, password, progress)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(vps_id = %ticket.vps_id, stage = %ticket.stage, error = %e, "Provisioning failed, rolling back.");
                if let Some(container_id) = ticket.container_id.clone() {
                    self.discard_container(&container_id).await;
                }
                if let Err(journal_err) = self.journal.finish(&ticket.vps_id).await {
                    warn!(vps_id = %ticket.vps_id, error = %journal_err, "Failed to close provisioning ticket.");
                }
                Err(e)
            }
        }
    }

    async fn run_provisioning_steps(
        &self,
        ticket: &mut ProvisionTicket,
        container_name: &str,
        username: &str,
        password: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(String, String), VpsError> {
        progress.report("🔄 Preparing network...").await;
        self.ensure_network().await?;
        self.journal.advance(ticket, ProvisionStage::NetworkReady).await?;

        progress.report("🔄 Creating container...").await;
        let spec = ContainerSpec::for_vps(
            container_name,
            &ticket.image,
            &setup::brand_slug(&self.settings.brand_name),
            &self.settings.network_name,
            &ticket.quota,
            self.settings.install_init_system,
        );
        let container_id = self.runtime.create_container(&spec).await?;
        ticket.container_id = Some(container_id.clone());
        self.journal
            .advance(ticket, ProvisionStage::ContainerCreated)
            .await?;

        if !self.settings.boot_delay.is_zero() {
            tokio::time::sleep(self.settings.boot_delay).await;
        }

        progress.report("🔄 Setting up container...").await;
        wait_for_package_lock(
            self.runtime.as_ref(),
            &container_id,
            self.settings.lock_policy,
            self.settings.exec_timeout,
            progress,
        )
        .await?;
        self.exec_checked(
            &container_id,
            setup::install_packages_script(self.settings.install_init_system),
        )
        .await?;

        progress.report("🔄 Configuring system...").await;
        self.exec_checked(&container_id, setup::create_login_script(username, password))
            .await?;
        if !self.settings.brand_name.trim().is_empty() {
            self.exec_checked(&container_id, setup::branding_script(&self.settings.brand_name))
                .await?;
        }
        self.runtime.restart(&container_id).await?;
        self.journal.advance(ticket, ProvisionStage::Configured).await?;

        progress.report("🔄 Setting up SSH access...").await;
        let session = self.open_session(&container_id).await?;
        self.journal
            .advance(ticket, ProvisionStage::SessionReady)
            .await?;

        Ok((container_id, session))
    }

    async fn close_ticket(&self, ticket: &mut ProvisionTicket) {
        if let Err(e) = self.journal.advance(ticket, ProvisionStage::Recorded).await {
            warn!(vps_id = %ticket.vps_id, error = %e, "Failed to journal recorded stage.");
        }
        if let Err(e) = self.journal.finish(&ticket.vps_id).await {
            warn!(vps_id = %ticket.vps_id, error = %e, "Failed to close provisioning ticket.");
        }
    }

    /// Provisions a new VPS and records it. No record is written unless a
    /// terminal session was captured.
    pub async fn create(
        &self,
        request: CreateRequest,
        progress: &dyn ProgressSink,
    ) -> Result<SessionInfo, VpsError> {
        let image = request
            .image
            .clone()
            .unwrap_or_else(|| self.settings.default_image.clone());
        self.validate_quota(&request.quota)?;
        self.validate_image(&image)?;

        let _owner_guard = self.lock_owner(&request.owner_id).await;
        self.ensure_below_limit(&request.owner_id).await?;

        let vps_id = self.unused_vps_id().await?;
        let _record_guard = self.lock_record(&vps_id).await;
        let username = login_name(&request.owner_name);
        let password = generate_password();

        let mut ticket = ProvisionTicket::new(
            &vps_id,
            &request.owner_id,
            ProvisionKind::Create,
            &image,
            request.quota,
        );
        self.journal.begin(&ticket).await?;
        info!(vps_id = %vps_id, owner_id = %request.owner_id, image = %image, quota = ?request.quota, "Creating VPS.");

        let container_name = format!("vps_{vps_id}");
        let (container_id, session) = self
            .provision_container(&mut ticket, &container_name, &username, &password, progress)
            .await?;

        let record = VpsRecord {
            id: vps_id.clone(),
            owner_id: request.owner_id.clone(),
            container_id: container_id.clone(),
            container_name,
            image,
            quota: request.quota,
            username,
            password,
            created_at: Utc::now(),
            status: VpsStatus::Running,
            tmate_session: Some(session.clone()),
        };

        if let Err(e) = self.records.put(&vps_id, record.clone()).await {
            error!(vps_id = %vps_id, error = %e, "Failed to persist new VPS, rolling back container.");
            self.discard_container(&container_id).await;
            if let Err(journal_err) = self.journal.finish(&vps_id).await {
                warn!(vps_id = %vps_id, error = %journal_err, "Failed to close provisioning ticket.");
            }
            return Err(e.into());
        }
        self.close_ticket(&mut ticket).await;

        info!(vps_id = %vps_id, container_id = %container_id, "VPS created.");
        Ok(SessionInfo { record, session })
    }

    pub async fn start(
        &self,
        vps_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<SessionInfo, VpsError> {
        let _guard = self.lock_record(vps_id).await;
        let mut record = self.require(vps_id).await?;

        if self.runtime.state(&record.container_id).await?.is_running() {
            return Err(VpsError::AlreadyInState(VpsStatus::Running));
        }

        self.runtime.start(&record.container_id).await?;
        record.status = VpsStatus::Running;
        self.records.put(vps_id, record.clone()).await?;
        info!(vps_id = %vps_id, "VPS started.");

        let session = self.prepare_session(&record.container_id, progress).await?;
        record.tmate_session = Some(session.clone());
        self.records.put(vps_id, record.clone()).await?;
        Ok(SessionInfo { record, session })
    }

    pub async fn stop(&self, vps_id: &str) -> Result<VpsRecord, VpsError> {
        let _guard = self.lock_record(vps_id).await;
        let mut record = self.require(vps_id).await?;

        if !self.runtime.state(&record.container_id).await?.is_running() {
            if record.status != VpsStatus::Stopped {
                record.status = VpsStatus::Stopped;
                self.records.put(vps_id, record).await?;
            }
            return Err(VpsError::AlreadyInState(VpsStatus::Stopped));
        }

        self.runtime.stop(&record.container_id).await?;
        record.status = VpsStatus::Stopped;
        self.records.put(vps_id, record.clone()).await?;
        info!(vps_id = %vps_id, "VPS stopped.");
        Ok(record)
    }

    pub async fn restart(
        &self,
        vps_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<SessionInfo, VpsError> {
        let _guard = self.lock_record(vps_id).await;
        let mut record = self.require(vps_id).await?;

        self.runtime.restart(&record.container_id).await?;
        record.status = VpsStatus::Running;
        self.records.put(vps_id, record.clone()).await?;
        info!(vps_id = %vps_id, "VPS restarted.");

        let session = self.prepare_session(&record.container_id, progress).await?;
        record.tmate_session = Some(session.clone());
        self.records.put(vps_id, record.clone()).await?;
        Ok(SessionInfo { record, session })
    }

    /// Captures a new terminal session on a running VPS.
    pub async fn refresh_session(
        &self,
        vps_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<SessionInfo, VpsError> {
        let _guard = self.lock_record(vps_id).await;
        let mut record = self.require(vps_id).await?;

        if !self.runtime.state(&record.container_id).await?.is_running() {
            return Err(VpsError::Validation(
                "VPS is stopped. Start it first.".to_string(),
            ));
        }

        let session = self.prepare_session(&record.container_id, progress).await?;
        record.tmate_session = Some(session.clone());
        record.status = VpsStatus::Running;
        self.records.put(vps_id, record.clone()).await?;
        Ok(SessionInfo { record, session })
    }

    pub async fn delete(&self, vps_id: &str) -> Result<VpsRecord, VpsError> {
        let _guard = self.lock_record(vps_id).await;
        let record = self.require(vps_id).await?;

        self.remove_container(&record.container_id).await?;
        self.records.delete(vps_id).await?;

        info!(vps_id = %vps_id, container_id = %record.container_id, "VPS deleted.");
        Ok(record)
    }

    /// Deletes every record, returning how many were removed. Failures are
    /// logged and skipped.
    pub async fn delete_all(&self) -> Result<usize, VpsError> {
        let mut deleted = 0;
        for record in self.records.list().await? {
            match self.delete(&record.id).await {
                Ok(_) => deleted += 1,
                Err(VpsError::NotFound(_)) => {}
                Err(e) => error!(vps_id = %record.id, error = %e, "Failed to delete VPS."),
            }
        }
        info!(deleted, "Deleted all VPS instances.");
        Ok(deleted)
    }

    /// Hands the VPS to another user. Only the owner changes.
    pub async fn transfer(&self, vps_id: &str, new_owner_id: &str) -> Result<VpsRecord, VpsError> {
        let _owner_guard = self.lock_owner(new_owner_id).await;
        let _guard = self.lock_record(vps_id).await;
        let mut record = self.require(vps_id).await?;

        if record.is_owned_by(new_owner_id) {
            return Err(VpsError::Validation(format!(
                "VPS {vps_id} already belongs to that user"
            )));
        }
        self.ensure_below_limit(new_owner_id).await?;

        let previous_owner = std::mem::replace(&mut record.owner_id, new_owner_id.to_string());
        self.records.put(vps_id, record.clone()).await?;
        info!(vps_id = %vps_id, from = %previous_owner, to = %new_owner_id, "VPS transferred.");
        Ok(record)
    }

    /// Rebuilds the VPS from `image`. The old container is only removed once
    /// the new one has a session and the record points at it.
    pub async fn reinstall(
        &self,
        vps_id: &str,
        image: &str,
        progress: &dyn ProgressSink,
    ) -> Result<SessionInfo, VpsError> {
        self.validate_image(image)?;
        let _guard = self.lock_record(vps_id).await;
        let mut record = self.require(vps_id).await?;

        let mut ticket = ProvisionTicket::new(
            vps_id,
            &record.owner_id,
            ProvisionKind::Reinstall,
            image,
            record.quota,
        );
        ticket.previous_container_id = Some(record.container_id.clone());
        self.journal.begin(&ticket).await?;
        info!(vps_id = %vps_id, image = %image, "Reinstalling VPS.");

        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
        let container_name = format!("vps_{vps_id}_{suffix}");
        let username = record.username.clone();
        let password = record.password.clone();
        let (container_id, session) = self
            .provision_container(&mut ticket, &container_name, &username, &password, progress)
            .await?;

        let old_container = std::mem::replace(&mut record.container_id, container_id.clone());
        record.container_name = container_name;
        record.image = image.to_string();
        record.status = VpsStatus::Running;
        record.tmate_session = Some(session.clone());

        if let Err(e) = self.records.put(vps_id, record.clone()).await {
            error!(vps_id = %vps_id, error = %e, "Failed to persist reinstalled VPS, keeping the old container.");
            self.discard_container(&container_id).await;
            if let Err(journal_err) = self.journal.finish(vps_id).await {
                warn!(vps_id = %vps_id, error = %journal_err, "Failed to close provisioning ticket.");
            }
            return Err(e.into());
        }
        self.discard_container(&old_container).await;
        self.close_ticket(&mut ticket).await;

        info!(vps_id = %vps_id, container_id = %container_id, "VPS reinstalled.");
        Ok(SessionInfo { record, session })
    }

    /// Raw `free -m` output from inside the container.
    pub async fn ram_usage(&self, vps_id: &str) -> Result<String, VpsError> {
        let record = self.require(vps_id).await?;
        if !self.runtime.state(&record.container_id).await?.is_running() {
            return Err(VpsError::Validation(
                "VPS is stopped. Start it first.".to_string(),
            ));
        }
        let output = self
            .exec_checked(&record.container_id, setup::MEMORY_USAGE.to_string())
            .await?;
        Ok(output.stdout)
    }

    pub async fn get(&self, vps_id: &str) -> Result<VpsRecord, VpsError> {
        self.require(vps_id).await
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<VpsRecord>, VpsError> {
        Ok(self
            .records
            .list()
            .await?
            .into_iter()
            .filter(|record| record.is_owned_by(owner_id))
            .collect())
    }

    pub async fn list_all(&self) -> Result<Vec<VpsRecord>, VpsError> {
        Ok(self.records.list().await?)
    }

    /// Lists every record after asking the runtime about its container.
    /// Records whose container no longer exists are deleted; observed status
    /// changes are written back.
    pub async fn list_verified(&self) -> Result<VerifiedListing, VpsError> {
        let mut listing = VerifiedListing::default();

        for record in self.records.list().await? {
            match self.runtime.state(&record.container_id).await {
                Ok(state) => {
                    let observed = if state.is_running() {
                        VpsStatus::Running
                    } else {
                        VpsStatus::Stopped
                    };
                    let record = if record.status != observed {
                        self.sync_status(&record.id, observed).await?.unwrap_or(record)
                    } else {
                        record
                    };
                    listing.entries.push(VerifiedVps {
                        record,
                        state: Some(state),
                    });
                }
                Err(RuntimeError::NotFound(_)) => {
                    if self.prune(&record).await? {
                        listing.pruned.push(record.id.clone());
                    }
                }
                Err(e) => {
                    warn!(vps_id = %record.id, error = %e, "Could not inspect container.");
                    listing.entries.push(VerifiedVps { record, state: None });
                }
            }
        }

        if !listing.pruned.is_empty() {
            info!(pruned = ?listing.pruned, "Pruned records whose container no longer exists.");
        }
        Ok(listing)
    }

    async fn sync_status(&self, vps_id: &str, status: VpsStatus) -> Result<Option<VpsRecord>, VpsError> {
        let _guard = self.lock_record(vps_id).await;
        let Some(mut current) = self.records.get(vps_id).await? else {
            return Ok(None);
        };
        current.status = status;
        self.records.put(vps_id, current.clone()).await?;
        Ok(Some(current))
    }

    /// Deletes the record if it still points at the missing container.
    async fn prune(&self, stale: &VpsRecord) -> Result<bool, VpsError> {
        let _guard = self.lock_record(&stale.id).await;
        match self.records.get(&stale.id).await? {
            Some(current) if current.container_id == stale.container_id => {
                self.records.delete(&stale.id).await?;
                warn!(vps_id = %stale.id, container_id = %stale.container_id, "Container is gone, pruned record.");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// One record with the runtime's view of its container. A missing
    /// container is reported as `state: None` without pruning.
    pub async fn inspect(&self, vps_id: &str) -> Result<VerifiedVps, VpsError> {
        let record = self.require(vps_id).await?;
        let state = match self.runtime.state(&record.container_id).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(vps_id = %vps_id, error = %e, "Could not inspect container.");
                None
            }
        };
        Ok(VerifiedVps { record, state })
    }

    pub async fn node_info(&self) -> Result<NodeInfo, VpsError> {
        let docker_version = self.runtime.server_version().await?;
        let records = self.records.list().await?;
        let mut running_vps = 0;
        for record in &records {
            if let Ok(state) = self.runtime.state(&record.container_id).await {
                if state.is_running() {
                    running_vps += 1;
                }
            }
        }
        Ok(NodeInfo {
            docker_version,
            network: self.settings.network_name.clone(),
            total_vps: records.len(),
            running_vps,
        })
    }

    /// Settles provisioning runs that were interrupted by a crash or
    /// shutdown. Returns the number of tickets closed.
    ///
    /// A run whose container the record already points at had finished, so
    /// only the container it replaced (if any) is removed. Any other run is
    /// rolled back by removing the container it created.
    pub async fn recover_interrupted(&self) -> Result<usize, VpsError> {
        let pending = self.journal.pending().await?;
        for ticket in &pending {
            let _guard = self.lock_record(&ticket.vps_id).await;
            let record = self.records.get(&ticket.vps_id).await?;
            let recorded = match (&record, &ticket.container_id) {
                (Some(record), Some(container_id)) => record.container_id == *container_id,
                _ => false,
            };

            if recorded {
                info!(vps_id = %ticket.vps_id, kind = ?ticket.kind, stage = %ticket.stage, "Provisioning had been recorded, closing ticket.");
                if let Some(previous) = &ticket.previous_container_id {
                    if ticket.container_id.as_ref() != Some(previous) {
                        self.discard_container(previous).await;
                    }
                }
            } else {
                warn!(vps_id = %ticket.vps_id, kind = ?ticket.kind, stage = %ticket.stage, "Rolling back interrupted provisioning.");
                if let Some(container_id) = &ticket.container_id {
                    self.discard_container(container_id).await;
                }
            }
            self.journal.finish(&ticket.vps_id).await?;
        }
        Ok(pending.len())
    }
}
