//! In-memory doubles shared by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::bot::config::BotConfig;
use crate::bot::state::AppState;
use crate::chat::{
    ChatError, ChatTransport, ChatUser, IncomingMessage, InteractionToken, MessageRef,
    OutgoingMessage,
};
use crate::db::{JsonFileStore, ResourceQuota, Store, VpsRecord};
use crate::docker::{
    ContainerRuntime, ContainerSpec, ContainerState, ExecOutput, RuntimeError, SessionStream,
};
use crate::provisioning::{
    CreateRequest, NoProgress, Orchestrator, OrchestratorSettings, ProgressSink, ProvisionJournal,
    ProvisionTicket,
};

struct FakeContainer {
    name: String,
    image: String,
    state: ContainerState,
    exec_log: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    networks: HashSet<String>,
    containers: HashMap<String, FakeContainer>,
    next_id: u32,
    sessions_opened: u32,
    lock_held_probes: u32,
    fail_create: bool,
    fail_exec_containing: Option<String>,
    session_output: Option<String>,
    removed: Vec<String>,
}

/// Container runtime double. Containers start running on creation, `lsof`
/// reports the dpkg lock free unless told otherwise, and tmate prints a
/// fresh session line on every spawn.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `probes` lock probes report the lock as held.
    pub fn hold_package_lock_for(&self, probes: u32) {
        self.state.lock().unwrap().lock_held_probes = probes;
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    /// Any exec whose command line contains `needle` exits with code 100.
    pub fn fail_exec_containing(&self, needle: &str) {
        self.state.lock().unwrap().fail_exec_containing = Some(needle.to_string());
    }

    /// Replaces what the session process prints. `None` restores the
    /// default tmate banner.
    pub fn set_session_output(&self, output: Option<&str>) {
        self.state.lock().unwrap().session_output = output.map(str::to_string);
    }

    pub fn remove_container_externally(&self, container_id: &str) {
        self.state.lock().unwrap().containers.remove(container_id);
    }

    pub fn set_state(&self, container_id: &str, state: ContainerState) {
        if let Some(container) = self.state.lock().unwrap().containers.get_mut(container_id) {
            container.state = state;
        }
    }

    pub fn state_of(&self, container_id: &str) -> Option<ContainerState> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(container_id)
            .map(|c| c.state.clone())
    }

    pub fn image_of(&self, container_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(container_id)
            .map(|c| c.image.clone())
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains(name)
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn exec_log(&self, container_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(container_id)
            .map(|c| c.exec_log.clone())
            .unwrap_or_default()
    }

    fn with_container<T>(
        &self,
        container_id: &str,
        f: impl FnOnce(&mut FakeContainer) -> T,
    ) -> Result<T, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        state
            .containers
            .get_mut(container_id)
            .map(f)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn network_exists(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(self.has_network(name))
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.state.lock().unwrap().networks.insert(name.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create || state.containers.values().any(|c| c.name == spec.name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker run --name {}", spec.name),
                code: 125,
                stderr: "container could not be created".to_string(),
            });
        }
        if !state.networks.contains(&spec.network) {
            return Err(RuntimeError::NotFound(format!("network {}", spec.network)));
        }
        state.next_id += 1;
        let id = format!("{:012x}", 0xc0ffee000u64 + u64::from(state.next_id));
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: spec.name.clone(),
                image: spec.image.clone(),
                state: ContainerState::Running,
                exec_log: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.with_container(container_id, |c| c.state = ContainerState::Running)
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.with_container(container_id, |c| c.state = ContainerState::Exited)
    }

    async fn restart(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.with_container(container_id, |c| c.state = ContainerState::Running)
    }

    async fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().unwrap();
        match state.containers.remove(container_id) {
            Some(_) => {
                state.removed.push(container_id.to_string());
                Ok(())
            }
            None => Err(RuntimeError::NotFound(container_id.to_string())),
        }
    }

    async fn state(&self, container_id: &str) -> Result<ContainerState, RuntimeError> {
        self.with_container(container_id, |c| c.state.clone())
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        _timeout: Duration,
    ) -> Result<ExecOutput, RuntimeError> {
        let line = command.join(" ");
        let mut state = self.state.lock().unwrap();
        let fail_needle = state.fail_exec_containing.clone();
        let container = state
            .containers
            .get_mut(container_id)
            .ok_or_else(|| RuntimeError::NotFound(container_id.to_string()))?;
        if !container.state.is_running() {
            return Err(RuntimeError::CommandFailed {
                command: "docker exec".to_string(),
                code: 1,
                stderr: format!("container {container_id} is not running"),
            });
        }
        container.exec_log.push(line.clone());

        if fail_needle.is_some_and(|needle| line.contains(&needle)) {
            return Ok(ExecOutput {
                exit_code: 100,
                stdout: String::new(),
                stderr: "E: simulated failure".to_string(),
            });
        }
        if line.contains("lsof") {
            let held = state.lock_held_probes > 0;
            if held {
                state.lock_held_probes -= 1;
            }
            return Ok(ExecOutput {
                exit_code: if held { 0 } else { 1 },
                ..ExecOutput::default()
            });
        }
        if line.contains("free -m") {
            return Ok(ExecOutput {
                exit_code: 0,
                stdout: "               total        used        free\nMem:            2048         312        1736\nSwap:              0           0           0\n".to_string(),
                stderr: String::new(),
            });
        }
        Ok(ExecOutput::default())
    }

    async fn spawn_session(
        &self,
        container_id: &str,
        _command: &[String],
    ) -> Result<SessionStream, RuntimeError> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(container_id) {
            return Err(RuntimeError::NotFound(container_id.to_string()));
        }
        state.sessions_opened += 1;
        let output = state.session_output.clone().unwrap_or_else(|| {
            format!(
                "web session: https://tmate.io/t/web{n}\nssh session: ssh sess{n}@nyc1.tmate.io\n",
                n = state.sessions_opened
            )
        });
        Ok(Box::new(Cursor::new(output.into_bytes())))
    }

    async fn server_version(&self) -> Result<String, RuntimeError> {
        Ok("24.0.7".to_string())
    }
}

/// Collects every progress line.
#[derive(Default)]
pub struct RecordingProgress {
    messages: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgress {
    async fn report(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Content of a message, or the title of its first embed.
fn summarize(message: &OutgoingMessage) -> String {
    message
        .content
        .clone()
        .or_else(|| message.embeds.first().and_then(|embed| embed.title.clone()))
        .unwrap_or_default()
}

#[derive(Default)]
struct ChatLog {
    next_message: u32,
    sent: Vec<(String, OutgoingMessage)>,
    edits: Vec<OutgoingMessage>,
    directs: Vec<(String, OutgoingMessage)>,
    responses: Vec<OutgoingMessage>,
    follow_ups: Vec<OutgoingMessage>,
    deferred: u32,
    fail_direct: bool,
}

/// Chat transport double that keeps everything the bot said.
#[derive(Default)]
pub struct RecordingChat {
    log: Mutex<ChatLog>,
}

impl RecordingChat {
    /// Makes every DM fail the way Discord does for closed DMs.
    pub fn fail_direct(&self, fail: bool) {
        self.log.lock().unwrap().fail_direct = fail;
    }

    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.iter().map(|(_, m)| summarize(m)).collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.log.lock().unwrap().edits.iter().map(summarize).collect()
    }

    pub fn directs(&self) -> Vec<(String, String)> {
        self.log
            .lock()
            .unwrap()
            .directs
            .iter()
            .map(|(user, m)| (user.clone(), summarize(m)))
            .collect()
    }

    pub fn direct_messages(&self) -> Vec<OutgoingMessage> {
        self.log.lock().unwrap().directs.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn responses(&self) -> Vec<String> {
        self.log.lock().unwrap().responses.iter().map(summarize).collect()
    }

    pub fn follow_ups(&self) -> Vec<String> {
        self.log.lock().unwrap().follow_ups.iter().map(summarize).collect()
    }

    pub fn deferred(&self) -> u32 {
        self.log.lock().unwrap().deferred
    }

    fn next_ref(log: &mut ChatLog, channel_id: &str) -> MessageRef {
        log.next_message += 1;
        MessageRef {
            channel_id: channel_id.to_string(),
            message_id: format!("m{}", log.next_message),
        }
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, ChatError> {
        let mut log = self.log.lock().unwrap();
        log.sent.push((channel_id.to_string(), message.clone()));
        Ok(Self::next_ref(&mut log, channel_id))
    }

    async fn edit_message(
        &self,
        _target: &MessageRef,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.log.lock().unwrap().edits.push(message.clone());
        Ok(())
    }

    async fn send_direct(
        &self,
        user_id: &str,
        message: &OutgoingMessage,
    ) -> Result<MessageRef, ChatError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_direct {
            return Err(ChatError::Api {
                status: 403,
                body: "Cannot send messages to this user".to_string(),
            });
        }
        log.directs.push((user_id.to_string(), message.clone()));
        let channel = format!("dm{user_id}");
        Ok(Self::next_ref(&mut log, &channel))
    }

    async fn user_name(&self, user_id: &str) -> Result<String, ChatError> {
        Ok(format!("user{user_id}"))
    }

    async fn respond(
        &self,
        _interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.log.lock().unwrap().responses.push(message.clone());
        Ok(())
    }

    async fn defer(&self, _interaction: &InteractionToken, _ephemeral: bool) -> Result<(), ChatError> {
        self.log.lock().unwrap().deferred += 1;
        Ok(())
    }

    async fn edit_original(
        &self,
        _interaction: &InteractionToken,
        _message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        Ok(())
    }

    async fn follow_up(
        &self,
        _interaction: &InteractionToken,
        message: &OutgoingMessage,
    ) -> Result<(), ChatError> {
        self.log.lock().unwrap().follow_ups.push(message.clone());
        Ok(())
    }
}

pub const ADMIN_ROLE: &str = "999";
pub const TEST_CHANNEL: &str = "c1";

/// A fully wired bot state over fakes and a temporary data directory.
pub struct TestBot {
    _dir: TempDir,
    pub runtime: Arc<FakeRuntime>,
    pub chat: Arc<RecordingChat>,
    pub state: AppState,
}

impl TestBot {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config: BotConfig = toml::from_str(&format!(
            r#"
discord_token = "test-token"
admin_role_id = {ADMIN_ROLE}
boot_delay_secs = 0
lock_retry_delay_secs = 0
exec_timeout_secs = 5
session_timeout_secs = 5
data_dir = "{}"
"#,
            dir.path().display()
        ))
        .unwrap();

        let runtime = Arc::new(FakeRuntime::new());
        let records = JsonFileStore::<VpsRecord>::open(config.vps_store_path())
            .await
            .unwrap();
        let tickets = JsonFileStore::<ProvisionTicket>::open(config.journal_path())
            .await
            .unwrap();
        let runtime_dyn: Arc<dyn ContainerRuntime> = runtime.clone();
        let records_dyn: Arc<dyn Store<VpsRecord>> = Arc::new(records);
        let orchestrator = Orchestrator::new(
            runtime_dyn,
            records_dyn,
            ProvisionJournal::new(Arc::new(tickets)),
            OrchestratorSettings::from(&config),
        );

        let chat = Arc::new(RecordingChat::default());
        let chat_dyn: Arc<dyn ChatTransport> = chat.clone();
        let state = AppState::new(Arc::new(config), Arc::new(orchestrator), chat_dyn, None);
        Self {
            _dir: dir,
            runtime,
            chat,
            state,
        }
    }

    /// Provisions a VPS directly through the orchestrator.
    pub async fn create_for(&self, owner_id: &str) -> String {
        let request = CreateRequest {
            owner_id: owner_id.to_string(),
            owner_name: "Alice".to_string(),
            quota: ResourceQuota { ram: 1, cpu: 1, disk: 5 },
            image: None,
        };
        self.state
            .orchestrator
            .create(request, &NoProgress)
            .await
            .unwrap()
            .record
            .id
    }

    pub async fn runtime_is_running(&self, vps_id: &str) -> bool {
        let record = self.state.orchestrator.get(vps_id).await.unwrap();
        self.runtime
            .state_of(&record.container_id)
            .is_some_and(|state| state.is_running())
    }

    pub fn message(&self, author_id: &str, content: &str, admin: bool) -> IncomingMessage {
        IncomingMessage {
            id: format!("msg-{content}"),
            channel_id: TEST_CHANNEL.to_string(),
            guild_id: Some("g1".to_string()),
            author: ChatUser {
                id: author_id.to_string(),
                name: format!("user{author_id}"),
                bot: false,
            },
            author_roles: if admin {
                vec![ADMIN_ROLE.to_string()]
            } else {
                Vec::new()
            },
            content: content.to_string(),
            mentions: Vec::new(),
        }
    }
}
