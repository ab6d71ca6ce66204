//! Vote ranking engine
//!
//! A raw up/down vote is resolved against a fixed transition table. Each
//! candidate transition is one conditional update in storage, tried in table
//! order; the first whose membership precondition still holds wins. Concurrent
//! votes on the same song therefore never read-modify-write the score.
//!
//! | Direction | From        | To          | Δscore |
//! |-----------|-------------|-------------|--------|
//! | up        | neither     | upvoted     | +1     |
//! | up        | upvoted     | neither     | -1     |
//! | up        | downvoted   | upvoted     | +2     |
//! | down      | neither     | downvoted   | -1     |
//! | down      | downvoted   | neither     | +1     |
//! | down      | upvoted     | downvoted   | -2     |

use crate::db::{QueueStore, Stores, UserStore};
use crate::error::{Error, Result};
use jukebox_common::events::{EventBus, EventPayload};
use jukebox_common::model::{Song, VoteDirection};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A user's membership in a song's voter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Neither,
    Upvoted,
    Downvoted,
}

impl Membership {
    /// Stored vote direction, `None` for no vote
    pub fn direction(self) -> Option<i64> {
        match self {
            Membership::Neither => None,
            Membership::Upvoted => Some(1),
            Membership::Downvoted => Some(-1),
        }
    }

    pub fn from_direction(direction: i64) -> Self {
        match direction {
            d if d > 0 => Membership::Upvoted,
            d if d < 0 => Membership::Downvoted,
            _ => Membership::Neither,
        }
    }
}

/// One row of the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub from: Membership,
    pub to: Membership,
    pub delta: i64,
}

const UP_TRANSITIONS: [VoteTransition; 3] = [
    VoteTransition { from: Membership::Neither, to: Membership::Upvoted, delta: 1 },
    VoteTransition { from: Membership::Upvoted, to: Membership::Neither, delta: -1 },
    VoteTransition { from: Membership::Downvoted, to: Membership::Upvoted, delta: 2 },
];

const DOWN_TRANSITIONS: [VoteTransition; 3] = [
    VoteTransition { from: Membership::Neither, to: Membership::Downvoted, delta: -1 },
    VoteTransition { from: Membership::Downvoted, to: Membership::Neither, delta: 1 },
    VoteTransition { from: Membership::Upvoted, to: Membership::Downvoted, delta: -2 },
];

/// Candidate transitions for a direction, in the order they are attempted
pub fn transitions(direction: VoteDirection) -> &'static [VoteTransition; 3] {
    match direction {
        VoteDirection::Up => &UP_TRANSITIONS,
        VoteDirection::Down => &DOWN_TRANSITIONS,
    }
}

/// Applies votes and queue edits, then announces the re-sorted queue
#[derive(Clone)]
pub struct RankingEngine {
    queue: Arc<dyn QueueStore>,
    users: Arc<dyn UserStore>,
    bus: EventBus,
}

impl RankingEngine {
    pub fn new(stores: &Stores, bus: EventBus) -> Self {
        Self {
            queue: stores.queue.clone(),
            users: stores.users.clone(),
            bus,
        }
    }

    /// Apply a raw vote and return the score delta
    ///
    /// Fails with `IllegalState` when no transition matched, which only happens
    /// if the song disappeared between lookup and write.
    pub async fn apply_vote(
        &self,
        session_id: &str,
        song_id: &str,
        user_id: &str,
        direction: VoteDirection,
    ) -> Result<i64> {
        let song = self.queue.get_song(session_id, song_id).await?;

        let mut applied = None;
        for transition in transitions(direction) {
            if self
                .queue
                .apply_vote_transition(session_id, song_id, user_id, transition)
                .await?
            {
                applied = Some(*transition);
                break;
            }
        }

        let Some(transition) = applied else {
            error!(
                session = %session_id,
                song = %song_id,
                user = %user_id,
                ?direction,
                "No vote transition matched"
            );
            return Err(Error::IllegalState(format!(
                "no vote transition matched for user {} on song {}",
                user_id, song_id
            )));
        };

        debug!(
            session = %session_id,
            song = %song_id,
            user = %user_id,
            from = ?transition.from,
            to = ?transition.to,
            delta = transition.delta,
            "Vote applied"
        );

        // The vote is committed; a missing suggester only loses the tally update
        if let Err(e) = self.users.increment_user_score(&song.suggested_by, transition.delta).await {
            warn!(
                session = %session_id,
                user = %song.suggested_by,
                error = %e,
                "Failed to update suggester score"
            );
        }

        self.publish_queue(session_id).await;
        Ok(transition.delta)
    }

    /// Add a freshly suggested song (score 1, suggester upvoted)
    pub async fn suggest(&self, session_id: &str, song: Song) -> Result<()> {
        self.queue.add_song(session_id, &song).await?;
        info!(session = %session_id, song = %song.id, user = %song.suggested_by, "Song suggested");

        self.bus.publish(session_id, EventPayload::SongAdded { song_id: song.id });
        self.publish_queue(session_id).await;
        Ok(())
    }

    /// Admin removal of a queued song
    pub async fn remove_song(&self, session_id: &str, song_id: &str) -> Result<()> {
        self.queue.remove_song(session_id, song_id).await?;
        info!(session = %session_id, song = %song_id, "Song removed");

        self.publish_queue(session_id).await;
        Ok(())
    }

    /// The session's queue in ranking order
    pub async fn ranked_queue(&self, session_id: &str) -> Result<Vec<Song>> {
        self.queue.list_songs_ordered(session_id).await
    }

    async fn publish_queue(&self, session_id: &str) {
        match self.queue.list_songs_ordered(session_id).await {
            Ok(songs) => self.bus.publish(session_id, EventPayload::PlaylistChanged { songs }),
            Err(e) => warn!(session = %session_id, error = %e, "Failed to list queue for update"),
        }
    }
}
