//! Error types for jukebox-player
//!
//! Storage, ranking and controller code return [`Error`]; the remote-player
//! capability has its own [`RemoteError`] so the sync subsystem can decide
//! whether a failure is worth retrying.

use thiserror::Error;

/// Main error type for jukebox-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON columns that failed to encode or decode
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session, song or user does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A conditional update found storage in a state no transition covers
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Remote player failures
    #[error("Remote player error: {0}")]
    Remote(#[from] RemoteError),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using jukebox-player Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to a user's remote player
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport level failure (connect, timeout, body decode)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response
    #[error("Remote player returned status {code}: {body}")]
    Status { code: u16, body: String },

    /// The provider asked us to back off
    #[error("Rate limited by remote player")]
    RateLimited,

    /// The user has no playback device at all
    #[error("No playback device available")]
    NoDevice,
}

impl RemoteError {
    /// Whether the sync subsystem should schedule another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RemoteError::RateLimited | RemoteError::NoDevice)
    }
}
