//! # Jukebox Common Library
//!
//! Shared code for the jukebox services:
//! - Event types and the group-scoped EventBus
//! - Domain model (songs, player state, remote clients)
//! - Timestamp helpers

pub mod events;
pub mod model;
pub mod time;

pub use events::{Event, EventBus, EventPayload, EventType, GroupId, Subscription};
pub use model::{PlayerState, RemoteClient, Song, UserSummary, VoteDirection};
