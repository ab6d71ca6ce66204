//! Playback orchestration
//!
//! The controller owns the logical "now playing" clock of every session and
//! keeps remote players in step with it.

mod controller;
mod handlers;
mod timers;

pub use controller::{ControllerConfig, ControllerHandle, PlaybackController};
