use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::permissions::{self, Access};
use super::presentation;
use super::state::AppState;
use crate::chat::{ChatError, IncomingMessage, MessageRef, OutgoingMessage};
use crate::db::VpsRecord;
use crate::provisioning::VpsError;

const DUPLICATE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(String),
    #[error("You don't have permission to use this command!")]
    PermissionDenied,
    #[error("This is not your VPS!")]
    NotOwner,
    #[error(transparent)]
    Vps(#[from] VpsError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Everything a handler needs for one invocation.
pub struct CommandContext<'a> {
    pub state: &'a AppState,
    pub message: &'a IncomingMessage,
    pub args: Vec<String>,
    pub is_admin: bool,
}

impl CommandContext<'_> {
    pub fn author_id(&self) -> &str {
        &self.message.author.id
    }

    pub async fn reply(&self, message: OutgoingMessage) -> Result<MessageRef, CommandError> {
        Ok(self
            .state
            .chat
            .send_message(&self.message.channel_id, &message)
            .await?)
    }

    pub async fn reply_text(&self, text: impl Into<String>) -> Result<MessageRef, CommandError> {
        self.reply(OutgoingMessage::text(text)).await
    }

    /// The positional argument at `index`, or a usage error.
    pub fn arg(&self, index: usize, usage: &str) -> Result<&str, CommandError> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| CommandError::Usage(usage.to_string()))
    }

    /// Loads a record the author is allowed to manage.
    pub async fn managed_record(&self, vps_id: &str) -> Result<VpsRecord, CommandError> {
        let record = self.state.orchestrator.get(vps_id).await?;
        permissions::ensure_owner_or_admin(&record, self.author_id(), self.is_admin)?;
        Ok(record)
    }
}

/// Uniform contract every chat command implements.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Argument synopsis without the prefix, e.g. `check_ram <vps_id>`.
    fn usage(&self) -> &'static str;

    fn access(&self) -> Access {
        Access::Basic
    }

    async fn run(&self, ctx: &CommandContext<'_>) -> Result<(), CommandError>;
}

/// Drops a message whose content equals the previous message from the same
/// author within the window.
pub struct DuplicateFilter {
    window: Duration,
    last: Mutex<HashMap<String, (String, Instant)>>,
}

impl DuplicateFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_duplicate(&self, author_id: &str, content: &str, now: Instant) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        last.retain(|_, (_, seen_at)| now.saturating_duration_since(*seen_at) < self.window);
        if let Some((previous, _)) = last.get(author_id) {
            if previous == content {
                return true;
            }
        }
        last.insert(author_id.to_string(), (content.to_string(), now));
        false
    }
}

/// Parses `<@123>`, `<@!123>` or a bare numeric id.
pub fn parse_mention(token: &str) -> Option<String> {
    let id = token
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|inner| inner.strip_prefix('!').unwrap_or(inner))
        .unwrap_or(token);
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| id.to_string())
}

/// Maps prefixed chat messages to registered handlers.
pub struct CommandDispatcher {
    prefix: String,
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
    duplicates: DuplicateFilter,
}

impl CommandDispatcher {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            handlers: HashMap::new(),
            duplicates: DuplicateFilter::new(DUPLICATE_WINDOW),
        }
    }

    pub fn register(&mut self, names: &[&'static str], handler: Arc<dyn CommandHandler>) {
        for &name in names {
            if self.handlers.insert(name, handler.clone()).is_some() {
                warn!(command = %name, "Command registered twice, keeping the later handler.");
            }
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Splits `content` into a command tag and its arguments when it starts
    /// with the prefix.
    pub fn parse<'c>(&self, content: &'c str) -> Option<(&'c str, Vec<String>)> {
        let body = content.trim().strip_prefix(self.prefix.as_str())?;
        let mut tokens = body.split_whitespace();
        let tag = tokens.next()?;
        Some((tag, tokens.map(str::to_string).collect()))
    }

    pub async fn dispatch(&self, state: &AppState, message: &IncomingMessage) {
        if message.author.bot {
            return;
        }
        if state
            .confirmations
            .offer(&message.channel_id, &message.author.id, &message.content)
        {
            return;
        }
        if self
            .duplicates
            .is_duplicate(&message.author.id, &message.content, Instant::now())
        {
            debug!(author = %message.author.id, "Dropping duplicate message.");
            return;
        }

        let Some((tag, args)) = self.parse(&message.content) else {
            return;
        };
        let Some(handler) = self.handlers.get(tag) else {
            debug!(command = %tag, "Unknown command.");
            return;
        };

        let ctx = CommandContext {
            state,
            message,
            args,
            is_admin: state.is_admin(&message.author_roles),
        };
        info!(command = %tag, author = %message.author.id, channel = %message.channel_id, "Running command.");

        let result = match permissions::check_access(handler.access(), ctx.is_admin) {
            Ok(()) => handler.run(&ctx).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            match &e {
                CommandError::PermissionDenied | CommandError::NotOwner | CommandError::Usage(_) => {
                    debug!(command = %tag, error = %e, "Command rejected.");
                }
                _ => error!(command = %tag, error = %e, "Command failed."),
            }
            let text = presentation::command_error_text(&e, &self.prefix);
            if let Err(send_err) = ctx.reply_text(text).await {
                error!(command = %tag, error = %send_err, "Failed to report command error.");
            }
        }
    }
}
