//! Remote player capability
//!
//! Users listen on their own devices through an external playback provider.
//! The controller never talks to the provider directly: it hands a
//! [`RemoteAction`] to [`RemoteSync`], which drives every synchronized client
//! through the [`RemotePlayer`] trait with per-client retries.

mod sync;
mod web_api;

pub use sync::{RemoteSync, RetryPolicy};
pub use web_api::WebApiPlayer;

use crate::error::RemoteError;
use async_trait::async_trait;
use jukebox_common::model::RemoteClient;
use serde::Deserialize;

/// A playback device known to the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    /// Restricted devices have no ID and cannot be targeted
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

/// What a client's player should be doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    /// Play `uri` starting at `position_ms`
    PlayAt { uri: String, position_ms: i64 },
    /// Hold at `position_ms`; with a URI the track is loaded first so a freshly
    /// synchronized client lands on the right song
    PauseAt { uri: Option<String>, position_ms: i64 },
    /// Silence the client (queue ran dry)
    Stop,
}

/// Operations the provider offers for one user's player
#[async_trait]
pub trait RemotePlayer: Send + Sync {
    async fn list_devices(&self, client: &RemoteClient) -> Result<Vec<Device>, RemoteError>;

    /// Make `device_id` the active output device
    async fn activate_device(&self, client: &RemoteClient, device_id: &str) -> Result<(), RemoteError>;

    async fn play(&self, client: &RemoteClient, uri: &str, position_ms: i64) -> Result<(), RemoteError>;

    /// Pause and hold at `position_ms`
    async fn pause(&self, client: &RemoteClient, position_ms: i64) -> Result<(), RemoteError>;

    async fn stop(&self, client: &RemoteClient) -> Result<(), RemoteError> {
        self.pause(client, 0).await
    }
}
