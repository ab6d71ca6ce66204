//! Per-session advance timers
//!
//! Owned by the controller loop; nothing else touches the map. A timer firing
//! only sends the session ID back to the loop, so the advance itself always
//! runs on the loop. Replacing or cancelling a timer that already fired is
//! harmless: the fire is accepted and the next scheduling call supersedes it.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

struct ArmedTimer {
    deadline: Instant,
    handle: JoinHandle<()>,
}

pub(crate) struct SessionTimers {
    timers: HashMap<String, ArmedTimer>,
    fired_tx: mpsc::UnboundedSender<String>,
}

impl SessionTimers {
    pub fn new(fired_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            timers: HashMap::new(),
            fired_tx,
        }
    }

    /// Arm (or re-arm) the advance timer of a session
    pub fn arm(&mut self, session_id: &str, delay: Duration) {
        let deadline = Instant::now() + delay;
        let fired_tx = self.fired_tx.clone();
        let session = session_id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = fired_tx.send(session);
        });

        trace!(session = %session_id, delay_ms = delay.as_millis() as u64, "Advance timer armed");
        if let Some(previous) = self.timers.insert(session_id.to_string(), ArmedTimer { deadline, handle }) {
            previous.handle.abort();
        }
    }

    /// Returns whether a timer was pending
    pub fn cancel(&mut self, session_id: &str) -> bool {
        match self.timers.remove(session_id) {
            Some(timer) => {
                let pending = !timer.handle.is_finished();
                timer.handle.abort();
                pending
            }
            None => false,
        }
    }

    /// Deadline of the session's timer if it has not fired yet
    pub fn deadline(&self, session_id: &str) -> Option<Instant> {
        self.timers
            .get(session_id)
            .filter(|timer| !timer.handle.is_finished())
            .map(|timer| timer.deadline)
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}
