//! Playback event handlers
//!
//! Each handler runs on the controller loop and returns `Result`; errors are
//! logged by the dispatcher.

use crate::error::{Error, Result};
use crate::remote::RemoteAction;
use chrono::{DateTime, Utc};
use jukebox_common::events::EventPayload;
use jukebox_common::model::PlayerState;
use jukebox_common::time::{self, millis_to_duration};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::controller::PlaybackController;

impl PlaybackController {
    /// A song joined the queue: start it if the player is idle
    pub(super) async fn on_song_added(&mut self, session_id: &str, song_id: &str) -> Result<()> {
        let state = self.stores.players.get_player_state(session_id).await?;
        if !state.is_empty_at(time::now()) {
            debug!(session = %session_id, song = %song_id, "Song queued behind current song");
            return Ok(());
        }

        debug!(session = %session_id, song = %song_id, "Song added to idle player");
        self.advance(session_id).await
    }

    pub(super) async fn on_play_pause(&mut self, session_id: &str, paused: bool) -> Result<()> {
        let state = self.stores.players.get_player_state(session_id).await?;
        if state.current_song.is_none() {
            warn!(session = %session_id, paused, "Play/pause without a current song");
            return Ok(());
        }

        let now = time::now();
        let matched = if paused {
            self.stores.players.set_paused(session_id, now).await?
        } else {
            self.stores.players.set_playing(session_id, now).await?
        };
        if !matched {
            debug!(session = %session_id, paused, "Player already in requested state");
            return Ok(());
        }

        let state = self.stores.players.get_player_state(session_id).await?;
        if paused {
            self.timers.cancel(session_id);
        } else {
            self.timers
                .arm(session_id, millis_to_duration(state.remaining_ms_at(now)));
        }

        info!(
            session = %session_id,
            paused,
            progress_ms = state.progress_ms_at(now),
            "Playback toggled"
        );
        self.publish_state(session_id, &state, now);
        let action = self.follow_action(&state, now);
        self.notify_session(session_id, &action).await;
        Ok(())
    }

    /// Move the clock so that progress equals `progress_ms`, keeping play/pause
    pub(super) async fn on_seek(&mut self, session_id: &str, progress_ms: i64) -> Result<()> {
        let mut state = self.stores.players.get_player_state(session_id).await?;
        if state.current_song.is_none() {
            warn!(session = %session_id, progress_ms, "Seek without a current song");
            return Ok(());
        }

        let now = time::now();
        let target = progress_ms.max(0);
        let delta = target - state.progress_ms_at(now);
        self.stores.players.increment_progress(session_id, delta).await?;
        state.pause_duration_ms -= delta;

        // Past the end the remaining time clamps to zero: advance right away
        if !state.paused {
            self.timers
                .arm(session_id, millis_to_duration(state.remaining_ms_at(now)));
        }

        debug!(session = %session_id, progress_ms = target, delta, "Seek applied");
        self.publish_state(session_id, &state, now);
        let action = self.follow_action(&state, now);
        self.notify_session(session_id, &action).await;
        Ok(())
    }

    /// Opt a user in or out of remote playback
    ///
    /// Opting in pushes one corrective action to that client only; opting out
    /// pauses it so it does not free-run.
    pub(super) async fn on_set_synchronized(
        &mut self,
        session_id: &str,
        user_id: &str,
        synchronized: bool,
    ) -> Result<()> {
        // Scoped to the session: a user of another session is NotFound here
        self.stores
            .users
            .set_synchronized(session_id, user_id, synchronized)
            .await?;
        self.bus.publish(
            session_id,
            EventPayload::UserSynchronizedChanged {
                user_id: user_id.to_string(),
                synchronized,
            },
        );

        let client = self.stores.users.get_remote_client(session_id, user_id).await?;
        let state = self.stores.players.get_player_state(session_id).await?;
        let now = time::now();

        let action = if synchronized {
            self.state_action(&state, now)
        } else {
            let position_ms = match state.current_song {
                Some(_) => state.progress_ms_at(now),
                None => 0,
            };
            RemoteAction::PauseAt { uri: None, position_ms }
        };

        info!(session = %session_id, user = %user_id, synchronized, "Synchronization changed");
        self.remote.notify(&[client], &action);
        Ok(())
    }

    pub(super) async fn on_connection_opened(&mut self, session_id: &str, user_id: &str) -> Result<()> {
        if self.config.auto_sync_on_connect {
            self.auto_sync(session_id, user_id, true).await?;
        }
        self.publish_user_list(session_id).await
    }

    pub(super) async fn on_connection_closed(&mut self, session_id: &str, user_id: &str) -> Result<()> {
        if self.config.auto_sync_on_connect {
            self.auto_sync(session_id, user_id, false).await?;
        }
        self.publish_user_list(session_id).await
    }

    /// Debug-only: force the session back to Empty and advance immediately
    pub(super) async fn on_reset(&mut self, session_id: &str) -> Result<()> {
        if !self.config.debug {
            return Err(Error::InvalidInput(
                "reset is only available in debug mode".to_string(),
            ));
        }

        let state = PlayerState::empty();
        self.stores.players.set_player_state(session_id, &state).await?;
        self.timers.arm(session_id, Duration::ZERO);

        warn!(session = %session_id, "Player state reset");
        self.publish_state(session_id, &state, time::now());
        Ok(())
    }

    /// Follow a live-update connection, skipping users without a remote player
    async fn auto_sync(&mut self, session_id: &str, user_id: &str, synchronized: bool) -> Result<()> {
        match self.stores.users.get_remote_client(session_id, user_id).await {
            // Closing a connection that was never synchronized needs no pause
            Ok(client) if !synchronized && !client.synchronized => Ok(()),
            Ok(_) => self.on_set_synchronized(session_id, user_id, synchronized).await,
            Err(Error::NotFound(_)) => {
                debug!(session = %session_id, user = %user_id, "No remote client to synchronize");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Action for clients that already follow the session's current song
    fn follow_action(&self, state: &PlayerState, now: DateTime<Utc>) -> RemoteAction {
        match &state.current_song {
            Some(song) if !state.paused => RemoteAction::PlayAt {
                uri: self.track_uri(song),
                position_ms: state.progress_ms_at(now),
            },
            Some(_) => RemoteAction::PauseAt { uri: None, position_ms: state.progress_ms_at(now) },
            None => RemoteAction::Stop,
        }
    }

    async fn publish_user_list(&self, session_id: &str) -> Result<()> {
        let users = self.stores.users.list_users(session_id).await?;
        self.bus.publish(session_id, EventPayload::UserListChanged { users });
        Ok(())
    }
}
