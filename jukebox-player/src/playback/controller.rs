//! Playback controller core
//!
//! One controller serves every session. It subscribes to the playback event
//! types on the wildcard group and processes events and timer fires strictly one
//! at a time on its own task, which is the only place the session timer map is
//! touched. Per session it moves between three states:
//!
//! - **Empty**: no current song (or the current song has run out)
//! - **Playing**: clock running, advance timer armed for the remaining time
//! - **Paused**: clock frozen, no timer
//!
//! Every mutation is persisted, followed by a `player_state_changed` event on the
//! session group and a remote action for the synchronized clients.
//!
//! Failures inside a handler are logged at the dispatch boundary and the event is
//! dropped; the loop itself only stops on shutdown.

use crate::db::Stores;
use crate::error::{Error, Result};
use crate::remote::{RemoteAction, RemoteSync};
use chrono::{DateTime, Utc};
use jukebox_common::events::{Event, EventBus, EventPayload, EventType, GroupId, Subscription};
use jukebox_common::model::{PlayerState, Song};
use jukebox_common::time::{self, millis_to_duration};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::timers::SessionTimers;

/// Controller settings
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Accept the `reset` event
    pub debug: bool,
    /// Synchronize users when their live-update connection opens
    pub auto_sync_on_connect: bool,
    /// Fixed delay before retrying an advance whose queue read failed
    pub advance_retry_delay: Duration,
    /// Prefix turning a song ID into a playable URI
    pub track_uri_prefix: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debug: false,
            auto_sync_on_connect: true,
            advance_retry_delay: Duration::from_millis(500),
            track_uri_prefix: "spotify:track:".to_string(),
        }
    }
}

struct TimerQuery {
    session_id: String,
    reply: oneshot::Sender<Option<Instant>>,
}

/// Handle to a running controller
pub struct ControllerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    queries: mpsc::UnboundedSender<TimerQuery>,
}

impl ControllerHandle {
    /// Time left on a session's advance timer, `None` when no timer is pending
    pub async fn timer_remaining(&self, session_id: &str) -> Option<Duration> {
        let (reply, rx) = oneshot::channel();
        self.queries
            .send(TimerQuery { session_id: session_id.to_string(), reply })
            .ok()?;
        let deadline = rx.await.ok()??;
        Some(deadline.saturating_duration_since(Instant::now()))
    }

    /// Stop the event loop and wait for it to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "Playback controller task failed");
        }
    }
}

/// Per-session playback state machine
pub struct PlaybackController {
    pub(super) bus: EventBus,
    pub(super) stores: Stores,
    pub(super) remote: Arc<RemoteSync>,
    pub(super) config: ControllerConfig,
    pub(super) timers: SessionTimers,
}

impl PlaybackController {
    /// Restore every known session and start the event loop
    ///
    /// The loop stops when `cancel` fires.
    pub async fn start(
        bus: EventBus,
        stores: Stores,
        remote: Arc<RemoteSync>,
        config: ControllerConfig,
        cancel: CancellationToken,
    ) -> Result<ControllerHandle> {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let (queries_tx, queries_rx) = mpsc::unbounded_channel();

        let mut controller = Self {
            bus,
            stores,
            remote,
            config,
            timers: SessionTimers::new(fired_tx),
        };

        // Subscribe first so nothing published during restore is missed
        let events = controller
            .bus
            .subscribe(EventType::PLAYBACK, &[GroupId::any()]);
        controller.restore_sessions().await?;

        let task = tokio::spawn(controller.run(events, fired_rx, queries_rx, cancel.clone()));

        Ok(ControllerHandle {
            cancel,
            task,
            queries: queries_tx,
        })
    }

    /// Rebuild the in-memory timers from persisted player state
    async fn restore_sessions(&mut self) -> Result<()> {
        let session_ids = self.stores.sessions.list_session_ids().await?;
        let now = time::now();

        for session_id in &session_ids {
            let state = match self.stores.players.get_player_state(session_id).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(session = %session_id, error = %e, "Failed to read player state, treating as empty");
                    PlayerState::empty()
                }
            };

            if state.is_empty_at(now) {
                self.timers.arm(session_id, Duration::ZERO);
                continue;
            }

            if !state.paused {
                self.timers.arm(session_id, millis_to_duration(state.remaining_ms_at(now)));
            }
            let action = self.state_action(&state, now);
            self.notify_session(session_id, &action).await;
        }

        info!(sessions = session_ids.len(), "Playback sessions restored");
        Ok(())
    }

    async fn run(
        mut self,
        mut events: Subscription,
        mut fired: mpsc::UnboundedReceiver<String>,
        mut queries: mpsc::UnboundedReceiver<TimerQuery>,
        cancel: CancellationToken,
    ) {
        info!("Playback controller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                Some(session_id) = fired.recv() => {
                    if let Err(e) = self.advance(&session_id).await {
                        error!(session = %session_id, error = %e, "Advance failed");
                    }
                }

                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        warn!("Event subscription closed");
                        break;
                    }
                },

                Some(query) = queries.recv() => {
                    let _ = query.reply.send(self.timers.deadline(&query.session_id));
                }
            }
        }

        self.timers.cancel_all();
        info!("Playback controller stopped");
    }

    async fn dispatch(&mut self, event: Event) {
        let group = event.group().clone();
        if group.is_any() {
            warn!(event_type = %event.event_type(), "Dropping playback event without a session");
            return;
        }
        let session_id = group.as_str();
        debug!(session = %session_id, event_type = %event.event_type(), "Handling playback event");

        let result = match event.payload() {
            EventPayload::SongAdded { song_id } => self.on_song_added(session_id, song_id).await,
            EventPayload::PlayPause { paused } => self.on_play_pause(session_id, *paused).await,
            EventPayload::Skip => self.advance(session_id).await,
            EventPayload::Seek { progress_ms } => self.on_seek(session_id, *progress_ms).await,
            EventPayload::SetSynchronized { user_id, synchronized } => {
                self.on_set_synchronized(session_id, user_id, *synchronized).await
            }
            EventPayload::ConnectionOpened { user_id } => self.on_connection_opened(session_id, user_id).await,
            EventPayload::ConnectionClosed { user_id } => self.on_connection_closed(session_id, user_id).await,
            EventPayload::Reset => self.on_reset(session_id).await,
            other => {
                warn!(event_type = %other.event_type(), "Unexpected event for playback controller");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(
                session = %session_id,
                event_type = %event.event_type(),
                error = %e,
                "Failed to handle playback event"
            );
        }
    }

    /// Make the highest-ranked queued song current, or go Empty
    pub(super) async fn advance(&mut self, session_id: &str) -> Result<()> {
        let songs = match self.stores.queue.list_songs_ordered(session_id).await {
            Ok(songs) => songs,
            Err(e) => {
                warn!(
                    session = %session_id,
                    error = %e,
                    retry_ms = self.config.advance_retry_delay.as_millis() as u64,
                    "Failed to fetch queue, retrying advance"
                );
                self.timers.arm(session_id, self.config.advance_retry_delay);
                return Ok(());
            }
        };

        let Some((next, rest)) = songs.split_first() else {
            return self.stop(session_id).await;
        };

        // A song removed concurrently still plays; any other failure leaves the queue untouched
        match self.stores.queue.remove_song(session_id, &next.id).await {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                warn!(session = %session_id, song = %next.id, "Song already gone from queue");
            }
            Err(e) => return Err(e),
        }
        self.bus.publish(session_id, EventPayload::PlaylistChanged { songs: rest.to_vec() });

        let now = time::now();
        let state = PlayerState::started(next.clone(), now);
        self.timers.arm(session_id, millis_to_duration(next.duration_ms));
        if let Err(e) = self.stores.players.set_player_state(session_id, &state).await {
            if matches!(e, Error::NotFound(_)) {
                self.timers.cancel(session_id);
            }
            return Err(e);
        }

        info!(session = %session_id, song = %next.id, title = %next.title, "Now playing");
        self.publish_state(session_id, &state, now);
        let action = RemoteAction::PlayAt { uri: self.track_uri(next), position_ms: 0 };
        self.notify_session(session_id, &action).await;
        Ok(())
    }

    /// Queue ran dry: go Empty and silence every synchronized client
    async fn stop(&mut self, session_id: &str) -> Result<()> {
        self.timers.cancel(session_id);

        let previous = self.stores.players.get_player_state(session_id).await?;
        if previous.current_song.is_none() {
            debug!(session = %session_id, "Queue empty, player already idle");
            return Ok(());
        }

        let state = PlayerState::empty();
        self.stores.players.set_player_state(session_id, &state).await?;

        info!(session = %session_id, "Queue empty, player stopped");
        self.publish_state(session_id, &state, time::now());
        self.notify_session(session_id, &RemoteAction::Stop).await;
        Ok(())
    }

    pub(super) fn track_uri(&self, song: &Song) -> String {
        format!("{}{}", self.config.track_uri_prefix, song.id)
    }

    /// Action that puts a client exactly where the session is
    pub(super) fn state_action(&self, state: &PlayerState, now: DateTime<Utc>) -> RemoteAction {
        match &state.current_song {
            None => RemoteAction::PauseAt { uri: None, position_ms: 0 },
            Some(song) if state.paused => RemoteAction::PauseAt {
                uri: Some(self.track_uri(song)),
                position_ms: state.progress_ms_at(now),
            },
            Some(song) => RemoteAction::PlayAt {
                uri: self.track_uri(song),
                position_ms: state.progress_ms_at(now),
            },
        }
    }

    pub(super) fn publish_state(&self, session_id: &str, state: &PlayerState, now: DateTime<Utc>) {
        let progress_ms = match state.current_song {
            Some(_) => state.progress_ms_at(now),
            None => 0,
        };
        self.bus.publish(
            session_id,
            EventPayload::PlayerStateChanged {
                current_song: state.current_song.clone(),
                is_playing: state.is_playing(),
                progress_ms,
                timestamp: now,
            },
        );
    }

    /// Push an action to every synchronized client of the session
    pub(super) async fn notify_session(&self, session_id: &str, action: &RemoteAction) {
        match self.stores.users.list_synchronized_clients(session_id).await {
            Ok(clients) => {
                debug!(session = %session_id, clients = clients.len(), ?action, "Notifying remote clients");
                self.remote.notify(&clients, action);
            }
            Err(e) => warn!(session = %session_id, error = %e, "Failed to list synchronized clients"),
        }
    }
}
