//! Best-effort remote player synchronization
//!
//! Every client gets its own task. A failed attempt is retried after
//! `min(base_delay * 2^attempt, max_delay)` up to `max_attempts` times, then
//! abandoned with a log entry. A client without any device, or one the provider
//! rate-limits, is abandoned immediately.
//!
//! Last write wins per client: scheduling a new action aborts the client's
//! pending task under the same lock that registers the new one, so a stale
//! retry can never apply an older action after a newer one was requested.

use super::{RemoteAction, RemotePlayer};
use crate::error::RemoteError;
use jukebox_common::model::RemoteClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Backoff settings for remote actions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2500
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

struct PendingSync {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap = Arc<Mutex<HashMap<String, PendingSync>>>;

/// Pushes playback actions to remote clients
pub struct RemoteSync {
    player: Arc<dyn RemotePlayer>,
    policy: RetryPolicy,
    pending: PendingMap,
    next_generation: AtomicU64,
}

impl RemoteSync {
    pub fn new(player: Arc<dyn RemotePlayer>, policy: RetryPolicy) -> Self {
        Self {
            player,
            policy,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Apply `action` to every client, each independently
    ///
    /// Returns immediately; the work happens in background tasks.
    pub fn notify(&self, clients: &[RemoteClient], action: &RemoteAction) {
        for client in clients {
            self.schedule(client.clone(), action.clone());
        }
    }

    /// Number of clients with an action still in flight
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Abort every in-flight action
    pub fn cancel_all(&self) {
        let mut pending = lock(&self.pending);
        for (_, sync) in pending.drain() {
            sync.handle.abort();
        }
    }

    fn schedule(&self, client: RemoteClient, action: RemoteAction) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let user_id = client.user_id.clone();

        // Hold the lock across spawn + insert so the new task cannot finish and
        // deregister before it is registered
        let mut pending = lock(&self.pending);

        let handle = tokio::spawn(run_action(
            Arc::clone(&self.player),
            self.policy.clone(),
            client,
            action,
            generation,
            Arc::clone(&self.pending),
        ));

        if let Some(previous) = pending.insert(user_id.clone(), PendingSync { generation, handle }) {
            if !previous.handle.is_finished() {
                debug!(user = %user_id, "Superseding pending remote action");
            }
            previous.handle.abort();
        }
    }
}

impl Drop for RemoteSync {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock(pending: &Mutex<HashMap<String, PendingSync>>) -> MutexGuard<'_, HashMap<String, PendingSync>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_action(
    player: Arc<dyn RemotePlayer>,
    policy: RetryPolicy,
    client: RemoteClient,
    action: RemoteAction,
    generation: u64,
    pending: PendingMap,
) {
    let mut attempt = 0;
    loop {
        match apply(player.as_ref(), &client, &action).await {
            Ok(()) => {
                debug!(user = %client.user_id, ?action, attempt, "Remote action applied");
                break;
            }
            Err(e) if !e.is_retryable() => {
                info!(user = %client.user_id, error = %e, "Abandoning remote action");
                break;
            }
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    warn!(
                        user = %client.user_id,
                        attempt,
                        error = %e,
                        "Remote action failed: max attempts reached"
                    );
                    break;
                }

                let backoff = policy.backoff(attempt - 1);
                warn!(
                    user = %client.user_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Remote action failed, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }

    let mut pending = lock(&pending);
    if pending.get(&client.user_id).map(|p| p.generation) == Some(generation) {
        pending.remove(&client.user_id);
    }
}

/// One attempt: make sure a device is active, then apply the action
async fn apply(player: &dyn RemotePlayer, client: &RemoteClient, action: &RemoteAction) -> Result<(), RemoteError> {
    let devices = player.list_devices(client).await?;

    if !devices.iter().any(|d| d.is_active) {
        let device_id = devices
            .iter()
            .find_map(|d| d.id.as_deref())
            .ok_or(RemoteError::NoDevice)?;
        debug!(user = %client.user_id, device = %device_id, "Activating inactive device");
        player.activate_device(client, device_id).await?;
    }

    match action {
        RemoteAction::PlayAt { uri, position_ms } => player.play(client, uri, *position_ms).await,
        RemoteAction::PauseAt { uri, position_ms } => {
            if let Some(uri) = uri {
                player.play(client, uri, *position_ms).await?;
            }
            player.pause(client, *position_ms).await
        }
        RemoteAction::Stop => player.stop(client).await,
    }
}
