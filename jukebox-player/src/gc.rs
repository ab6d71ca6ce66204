//! Session garbage collection
//!
//! Periodically deletes sessions idle for longer than the expiration, together
//! with their users, songs, votes and player state, and drops every event bus
//! subscription scoped to them.

use crate::db::SessionStore;
use crate::error::Result;
use jukebox_common::events::{EventBus, GroupId};
use jukebox_common::time;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct SessionCollector {
    sessions: Arc<dyn SessionStore>,
    bus: EventBus,
    interval: Duration,
    expiration: Duration,
}

impl SessionCollector {
    pub fn new(sessions: Arc<dyn SessionStore>, bus: EventBus, interval: Duration, expiration: Duration) -> Self {
        Self {
            sessions,
            bus,
            interval,
            expiration,
        }
    }

    /// Delete expired sessions once; returns how many were removed
    pub async fn collect(&self) -> Result<usize> {
        let expiration = chrono::Duration::seconds(self.expiration.as_secs() as i64);
        let cutoff = time::now()
            .checked_sub_signed(expiration)
            .unwrap_or_default();

        let expired = self.sessions.list_expired_sessions(cutoff).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let deleted = self.sessions.delete_sessions(&expired).await?;
        let groups: Vec<GroupId> = expired.iter().map(GroupId::from).collect();
        self.bus.remove_groups(&groups);

        info!(sessions = deleted, "Expired sessions deleted");
        Ok(expired.len())
    }

    /// Collect on every tick until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately; start collecting one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.collect().await {
                        error!(error = %e, "Session garbage collection failed");
                    }
                }
            }
        }

        info!("Session collector stopped");
    }
}
