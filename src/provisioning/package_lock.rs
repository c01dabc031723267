use std::time::Duration;
use tracing::{info, warn};

use super::{ProgressSink, RetryPolicy, VpsError};
use crate::docker::{ContainerRuntime, RuntimeError, shell};

const KILL_PACKAGE_MANAGERS: &str = "killall apt apt-get dpkg 2>/dev/null || true";
const REMOVE_LOCK_FILES: &str =
    "rm -f /var/lib/apt/lists/lock /var/cache/apt/archives/lock /var/lib/dpkg/lock*";
/// `lsof` exits 0 only when some process holds the file open.
const PROBE_LOCK: &str = "lsof /var/lib/dpkg/lock-frontend";

/// Forcibly frees the package manager inside the container, then waits until
/// the dpkg frontend lock is no longer held.
///
/// Each attempt kills known package manager processes, removes stale lock
/// files and probes the lock. Returns the number of attempts used, or
/// [`VpsError::PackageLockHeld`] once the policy's ceiling is reached.
pub async fn wait_for_package_lock(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    policy: RetryPolicy,
    exec_timeout: Duration,
    progress: &dyn ProgressSink,
) -> Result<u32, VpsError> {
    let result = policy
        .run("Waiting for package manager to be ready", progress, |attempt| async move {
            runtime
                .exec(container_id, &shell(KILL_PACKAGE_MANAGERS), exec_timeout)
                .await?;
            runtime
                .exec(container_id, &shell(REMOVE_LOCK_FILES), exec_timeout)
                .await?;
            let probe = runtime
                .exec(container_id, &shell(PROBE_LOCK), exec_timeout)
                .await?;
            if probe.success() {
                Err(RuntimeError::Busy(
                    "/var/lib/dpkg/lock-frontend is held".to_string(),
                ))
            } else {
                Ok(attempt)
            }
        })
        .await;

    match result {
        Ok(attempts) => {
            info!(container_id = %container_id, attempts, "Package manager lock is free.");
            Ok(attempts)
        }
        Err(RuntimeError::Busy(_)) => {
            warn!(container_id = %container_id, attempts = policy.max_attempts, "Package manager lock still held, giving up.");
            Err(VpsError::PackageLockHeld {
                attempts: policy.max_attempts,
            })
        }
        Err(e) => Err(VpsError::Runtime(e)),
    }
}
