//! # Jukebox Player Library (jukebox-player)
//!
//! Playback-synchronization core of a collaborative, vote-ranked music queue.
//!
//! **Purpose:** Rank suggested songs by votes, run a per-session "now playing"
//! clock that survives restarts, fan changes out to live-update clients, and
//! drive every participant's remote player with bounded retries.
//!
//! **Architecture:** Request producers publish onto the shared
//! [`EventBus`](jukebox_common::EventBus); the [`PlaybackController`] consumes
//! playback events for all sessions, persists state through the [`db`] traits
//! and pushes actions through [`remote::RemoteSync`].

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod gc;
pub mod playback;
pub mod ranking;
pub mod remote;

pub use error::{Error, Result};
pub use playback::{ControllerConfig, ControllerHandle, PlaybackController};
pub use ranking::RankingEngine;
