//! Shared fixtures for jukebox-player integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use jukebox_common::events::{Event, EventPayload, Subscription};
use jukebox_common::model::{RemoteClient, Song};
use jukebox_player::db::{init, NewUser, Stores};
use jukebox_player::error::RemoteError;
use jukebox_player::remote::{Device, RemotePlayer};
use sqlx::sqlite::SqlitePoolOptions;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// In-memory database with the schema applied
pub async fn setup_stores() -> Stores {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init::init_schema(&pool).await.expect("Failed to create schema");
    Stores::sqlite(pool)
}

pub fn unique_session() -> String {
    format!("session-{}", uuid::Uuid::new_v4())
}

pub async fn create_session(stores: &Stores) -> String {
    let session_id = unique_session();
    stores
        .sessions
        .create_session(&session_id, jukebox_common::time::now())
        .await
        .expect("Failed to create session");
    session_id
}

/// Add a user; with `token` the user has a remote player
pub async fn add_user(stores: &Stores, session_id: &str, user_id: &str, token: Option<&str>, synchronized: bool) {
    stores
        .users
        .add_user(&NewUser {
            id: user_id.to_string(),
            session_id: session_id.to_string(),
            username: user_id.to_string(),
            is_admin: false,
            auth_token: token.map(str::to_string),
        })
        .await
        .expect("Failed to add user");
    if synchronized {
        stores
            .users
            .set_synchronized(session_id, user_id, true)
            .await
            .expect("Failed to synchronize user");
    }
}

pub fn song(id: &str, duration_ms: i64, suggested_by: &str) -> Song {
    Song::suggested(id, format!("Song {}", id), vec!["Artist".to_string()], duration_ms, suggested_by)
}

/// Song with an explicit score and voter sets
pub fn song_with_votes(id: &str, score: i64, up: &[&str], down: &[&str]) -> Song {
    let mut song = song(id, 60_000, "suggester");
    song.score = score;
    song.upvoters = up.iter().map(|u| u.to_string()).collect::<BTreeSet<_>>();
    song.downvoters = down.iter().map(|u| u.to_string()).collect::<BTreeSet<_>>();
    song
}

/// Remote player that always has an active device and records every call
#[derive(Default)]
pub struct RecordingPlayer {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingPlayer {
    fn record(&self, client: &RemoteClient, call: String) {
        self.calls.lock().unwrap().push((client.user_id.clone(), call));
    }

    pub fn calls_for(&self, user_id: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Wait until `user_id` has a call starting with `prefix`
    pub async fn wait_for_call(&self, user_id: &str, prefix: &str) -> String {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(call) = self.calls_for(user_id).into_iter().find(|c| c.starts_with(prefix)) {
                return call;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "no call starting with {:?} for {}; calls: {:?}",
                    prefix,
                    user_id,
                    self.calls_for(user_id)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl RemotePlayer for RecordingPlayer {
    async fn list_devices(&self, _client: &RemoteClient) -> Result<Vec<Device>, RemoteError> {
        Ok(vec![Device {
            id: Some("device-1".to_string()),
            name: "Speaker".to_string(),
            is_active: true,
        }])
    }

    async fn activate_device(&self, client: &RemoteClient, device_id: &str) -> Result<(), RemoteError> {
        self.record(client, format!("activate:{}", device_id));
        Ok(())
    }

    async fn play(&self, client: &RemoteClient, uri: &str, position_ms: i64) -> Result<(), RemoteError> {
        self.record(client, format!("play:{}@{}", uri, position_ms));
        Ok(())
    }

    async fn pause(&self, client: &RemoteClient, position_ms: i64) -> Result<(), RemoteError> {
        self.record(client, format!("pause@{}", position_ms));
        Ok(())
    }

    async fn stop(&self, client: &RemoteClient) -> Result<(), RemoteError> {
        self.record(client, "stop".to_string());
        Ok(())
    }
}

/// Receive events until one matches, failing after [`WAIT`]
pub async fn expect_event<F>(sub: &mut Subscription, mut matches: F) -> Event
where
    F: FnMut(&EventPayload) -> bool,
{
    let result = tokio::time::timeout(WAIT, async {
        while let Some(event) = sub.recv().await {
            if matches(event.payload()) {
                return Some(event);
            }
        }
        None
    })
    .await;

    match result {
        Ok(Some(event)) => event,
        Ok(None) => panic!("subscription closed before expected event"),
        Err(_) => panic!("timed out waiting for event"),
    }
}

/// Wait for a `player_state_changed` whose current song ID is `song_id`
pub async fn expect_now_playing(sub: &mut Subscription, song_id: Option<&str>) -> Event {
    expect_event(sub, |payload| match payload {
        EventPayload::PlayerStateChanged { current_song, .. } => {
            current_song.as_ref().map(|s| s.id.as_str()) == song_id
        }
        _ => false,
    })
    .await
}
