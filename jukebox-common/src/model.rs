//! Domain model shared by storage, controller and live-update consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A song suggested into a session's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Provider track identifier
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub duration_ms: i64,
    /// User ID of the suggester
    pub suggested_by: String,
    /// Derived from votes; only the ranking engine changes it
    pub score: i64,
    pub upvoters: BTreeSet<String>,
    pub downvoters: BTreeSet<String>,
    pub time_added: DateTime<Utc>,
}

impl Song {
    /// Create a freshly suggested song
    ///
    /// The suggester is counted as the first upvote, so a new song starts at score 1.
    pub fn suggested(
        id: impl Into<String>,
        title: impl Into<String>,
        artists: Vec<String>,
        duration_ms: i64,
        suggested_by: impl Into<String>,
    ) -> Self {
        let suggested_by = suggested_by.into();
        let mut upvoters = BTreeSet::new();
        upvoters.insert(suggested_by.clone());
        Self {
            id: id.into(),
            title: title.into(),
            artists,
            duration_ms,
            suggested_by,
            score: 1,
            upvoters,
            downvoters: BTreeSet::new(),
            time_added: crate::time::now(),
        }
    }

    /// Queue ordering: higher score first, then earliest suggestion
    ///
    /// The song ID is the final tie-breaker so the order is total.
    pub fn rank_cmp(&self, other: &Song) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| self.time_added.cmp(&other.time_added))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Direction of a raw vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// Persisted per-session playback state
///
/// Progress is never stored directly; it is derived from the timestamps:
/// `progress = (paused ? pause_start : now) - song_start - pause_duration`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub current_song: Option<Song>,
    pub song_start: DateTime<Utc>,
    pub pause_start: DateTime<Utc>,
    /// Accumulated paused time; negative after a forward seek
    pub pause_duration_ms: i64,
    pub paused: bool,
}

impl PlayerState {
    /// State with no current song
    pub fn empty() -> Self {
        Self::default()
    }

    /// State for a song that starts playing at `now`
    pub fn started(song: Song, now: DateTime<Utc>) -> Self {
        Self {
            current_song: Some(song),
            song_start: now,
            pause_start: now,
            pause_duration_ms: 0,
            paused: false,
        }
    }

    /// Elapsed playback time within the current song, never negative
    pub fn progress_ms_at(&self, now: DateTime<Utc>) -> i64 {
        let end = if self.paused { self.pause_start } else { now };
        let elapsed = (end - self.song_start).num_milliseconds() - self.pause_duration_ms;
        elapsed.max(0)
    }

    pub fn progress_ms(&self) -> i64 {
        self.progress_ms_at(crate::time::now())
    }

    /// Time left until the current song ends, floored at zero
    pub fn remaining_ms_at(&self, now: DateTime<Utc>) -> i64 {
        match &self.current_song {
            Some(song) => (song.duration_ms - self.progress_ms_at(now)).max(0),
            None => 0,
        }
    }

    /// No song, or the current song has run to its end
    pub fn is_empty_at(&self, now: DateTime<Utc>) -> bool {
        match &self.current_song {
            None => true,
            Some(song) => self.progress_ms_at(now) >= song.duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty_at(crate::time::now())
    }

    pub fn is_playing(&self) -> bool {
        self.current_song.is_some() && !self.paused
    }
}

/// A user's connection to the external playback provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteClient {
    pub user_id: String,
    pub auth_token: String,
    /// Set by the user; gates whether playback actions are pushed to this client
    pub synchronized: bool,
}

/// User entry as shown to live-update consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub is_admin: bool,
    pub score: i64,
    pub synchronized: bool,
}
