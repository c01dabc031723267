use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::oneshot;

struct Waiter {
    expected: String,
    reply: oneshot::Sender<()>,
}

/// Confirmation words awaited from a specific user in a specific channel,
/// such as the `yes` that confirms a destructive command.
#[derive(Default)]
pub struct PendingConfirmations {
    waiting: DashMap<(String, String), Waiter>,
}

impl PendingConfirmations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `user_id` sends `expected` (case-insensitive) in
    /// `channel_id`. Returns `false` on timeout or when a newer wait for the
    /// same pair replaces this one.
    pub async fn wait_for(
        &self,
        channel_id: &str,
        user_id: &str,
        expected: &str,
        timeout: Duration,
    ) -> bool {
        let key = (channel_id.to_string(), user_id.to_string());
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(
            key.clone(),
            Waiter {
                expected: expected.to_lowercase(),
                reply: tx,
            },
        );

        let confirmed = matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())));
        self.waiting.remove_if(&key, |_, waiter| waiter.reply.is_closed());
        confirmed
    }

    /// Returns `true` when `content` completed a pending wait and should not
    /// be processed any further.
    pub fn offer(&self, channel_id: &str, user_id: &str, content: &str) -> bool {
        let key = (channel_id.to_string(), user_id.to_string());
        let answer = content.trim().to_lowercase();
        match self.waiting.remove_if(&key, |_, waiter| waiter.expected == answer) {
            Some((_, waiter)) => waiter.reply.send(()).is_ok(),
            None => false,
        }
    }
}
