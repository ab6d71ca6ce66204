//! Event types for the jukebox event system
//!
//! Every event carries a strongly-typed payload. The [`EventType`] of an event is
//! derived from its payload variant, so a subscriber that matches on the payload
//! never sees a shape it did not ask for.

mod bus;

pub use bus::{EventBus, Subscription};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::model::{Song, UserSummary};

/// Event kind used for routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SongAdded,
    PlayPause,
    Skip,
    Seek,
    SetSynchronized,
    ConnectionOpened,
    ConnectionClosed,
    Reset,
    PlayerStateChanged,
    PlaylistChanged,
    UserListChanged,
    UserSynchronizedChanged,
}

impl EventType {
    /// Events that affect playback and are consumed by the playback controller
    pub const PLAYBACK: &'static [EventType] = &[
        EventType::SongAdded,
        EventType::PlayPause,
        EventType::Skip,
        EventType::Seek,
        EventType::SetSynchronized,
        EventType::ConnectionOpened,
        EventType::ConnectionClosed,
        EventType::Reset,
    ];

    /// Events published for real-time UI consumers
    pub const LIVE_UPDATES: &'static [EventType] = &[
        EventType::PlayerStateChanged,
        EventType::PlaylistChanged,
        EventType::UserListChanged,
        EventType::UserSynchronizedChanged,
    ];

    /// Get event type as string (SSE event name, log field)
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SongAdded => "song_added",
            EventType::PlayPause => "play_pause",
            EventType::Skip => "skip",
            EventType::Seek => "seek",
            EventType::SetSynchronized => "set_synchronized",
            EventType::ConnectionOpened => "connection_opened",
            EventType::ConnectionClosed => "connection_closed",
            EventType::Reset => "reset",
            EventType::PlayerStateChanged => "player_state_changed",
            EventType::PlaylistChanged => "playlist_changed",
            EventType::UserListChanged => "user_list_changed",
            EventType::UserSynchronizedChanged => "user_synchronized_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session scope of an event
///
/// The wildcard group `*` means "not scoped to one session": a subscription on
/// the wildcard receives the event type for every session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    const ANY: &'static str = "*";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The wildcard group
    pub fn any() -> Self {
        Self(Self::ANY.to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&String> for GroupId {
    fn from(id: &String) -> Self {
        Self(id.clone())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event payloads
///
/// Serialized with a `type` tag for SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A song was suggested into the session queue
    SongAdded { song_id: String },

    /// Pause (`paused = true`) or resume playback
    PlayPause { paused: bool },

    /// Advance to the next song immediately
    Skip,

    /// Move the playback position of the current song
    Seek { progress_ms: i64 },

    /// A user opted in or out of remote playback synchronization
    SetSynchronized { user_id: String, synchronized: bool },

    /// A live-update connection was opened by a user
    ConnectionOpened { user_id: String },

    /// A live-update connection was closed
    ConnectionClosed { user_id: String },

    /// Reinitialize the session player (debug mode only)
    Reset,

    /// Player state changed
    ///
    /// Published by the playback controller after every playback mutation.
    PlayerStateChanged {
        current_song: Option<Song>,
        is_playing: bool,
        progress_ms: i64,
        timestamp: DateTime<Utc>,
    },

    /// Session queue changed (full ranked contents)
    PlaylistChanged { songs: Vec<Song> },

    /// Session user list changed
    UserListChanged { users: Vec<UserSummary> },

    /// A user's synchronized flag changed
    UserSynchronizedChanged { user_id: String, synchronized: bool },
}

impl EventPayload {
    /// Get the routing type of this payload
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::SongAdded { .. } => EventType::SongAdded,
            EventPayload::PlayPause { .. } => EventType::PlayPause,
            EventPayload::Skip => EventType::Skip,
            EventPayload::Seek { .. } => EventType::Seek,
            EventPayload::SetSynchronized { .. } => EventType::SetSynchronized,
            EventPayload::ConnectionOpened { .. } => EventType::ConnectionOpened,
            EventPayload::ConnectionClosed { .. } => EventType::ConnectionClosed,
            EventPayload::Reset => EventType::Reset,
            EventPayload::PlayerStateChanged { .. } => EventType::PlayerStateChanged,
            EventPayload::PlaylistChanged { .. } => EventType::PlaylistChanged,
            EventPayload::UserListChanged { .. } => EventType::UserListChanged,
            EventPayload::UserSynchronizedChanged { .. } => EventType::UserSynchronizedChanged,
        }
    }
}

/// A published event
///
/// Immutable once published; clones share the payload.
#[derive(Debug, Clone)]
pub struct Event {
    group: GroupId,
    payload: Arc<EventPayload>,
}

impl Event {
    pub fn new(group: GroupId, payload: EventPayload) -> Self {
        Self {
            group,
            payload: Arc::new(payload),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn group(&self) -> &GroupId {
        &self.group
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }
}
