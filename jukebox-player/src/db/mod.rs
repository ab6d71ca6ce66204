//! Storage collaborators
//!
//! The ranking engine and the playback controller only see the traits below.
//! [`SqliteStore`] implements all of them on one pool; [`Stores`] hands each
//! consumer the trait objects it needs.

pub mod init;
pub mod players;
pub mod sessions;
pub mod songs;
pub mod users;

use crate::error::Result;
use crate::ranking::VoteTransition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jukebox_common::model::{PlayerState, RemoteClient, Song, UserSummary};
use sqlx::SqlitePool;
use std::sync::Arc;

pub use users::NewUser;

/// Per-session song queue
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn add_song(&self, session_id: &str, song: &Song) -> Result<()>;
    async fn remove_song(&self, session_id: &str, song_id: &str) -> Result<()>;
    async fn get_song(&self, session_id: &str, song_id: &str) -> Result<Song>;
    async fn list_songs_ordered(&self, session_id: &str) -> Result<Vec<Song>>;

    /// Conditional compare-and-set on the user's voter-set membership
    async fn apply_vote_transition(
        &self,
        session_id: &str,
        song_id: &str,
        user_id: &str,
        transition: &VoteTransition,
    ) -> Result<bool>;
}

/// Persisted per-session playback state
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn get_player_state(&self, session_id: &str) -> Result<PlayerState>;
    async fn set_player_state(&self, session_id: &str, state: &PlayerState) -> Result<()>;
    /// Matches only when not paused
    async fn set_paused(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool>;
    /// Matches only when paused
    async fn set_playing(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool>;
    async fn increment_progress(&self, session_id: &str, delta_ms: i64) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn add_user(&self, user: &NewUser) -> Result<()>;
    async fn get_remote_client(&self, session_id: &str, user_id: &str) -> Result<RemoteClient>;
    async fn list_synchronized_clients(&self, session_id: &str) -> Result<Vec<RemoteClient>>;
    async fn set_synchronized(&self, session_id: &str, user_id: &str, synchronized: bool) -> Result<()>;
    async fn increment_user_score(&self, user_id: &str, delta: i64) -> Result<()>;
    async fn list_users(&self, session_id: &str) -> Result<Vec<UserSummary>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()>;
    async fn session_exists(&self, session_id: &str) -> Result<bool>;
    async fn list_session_ids(&self) -> Result<Vec<String>>;
    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()>;
    async fn list_expired_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;
    async fn delete_sessions(&self, session_ids: &[String]) -> Result<u64>;
}

/// SQLite-backed implementation of every storage trait
#[derive(Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn add_song(&self, session_id: &str, song: &Song) -> Result<()> {
        songs::add_song(&self.db, session_id, song).await
    }

    async fn remove_song(&self, session_id: &str, song_id: &str) -> Result<()> {
        songs::remove_song(&self.db, session_id, song_id).await
    }

    async fn get_song(&self, session_id: &str, song_id: &str) -> Result<Song> {
        songs::get_song(&self.db, session_id, song_id).await
    }

    async fn list_songs_ordered(&self, session_id: &str) -> Result<Vec<Song>> {
        songs::list_songs_ordered(&self.db, session_id).await
    }

    async fn apply_vote_transition(
        &self,
        session_id: &str,
        song_id: &str,
        user_id: &str,
        transition: &VoteTransition,
    ) -> Result<bool> {
        songs::apply_vote_transition(&self.db, session_id, song_id, user_id, transition).await
    }
}

#[async_trait]
impl PlayerStore for SqliteStore {
    async fn get_player_state(&self, session_id: &str) -> Result<PlayerState> {
        players::get_player_state(&self.db, session_id).await
    }

    async fn set_player_state(&self, session_id: &str, state: &PlayerState) -> Result<()> {
        players::set_player_state(&self.db, session_id, state).await
    }

    async fn set_paused(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
        players::set_paused(&self.db, session_id, now).await
    }

    async fn set_playing(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
        players::set_playing(&self.db, session_id, now).await
    }

    async fn increment_progress(&self, session_id: &str, delta_ms: i64) -> Result<()> {
        players::increment_progress(&self.db, session_id, delta_ms).await
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn add_user(&self, user: &NewUser) -> Result<()> {
        users::add_user(&self.db, user).await
    }

    async fn get_remote_client(&self, session_id: &str, user_id: &str) -> Result<RemoteClient> {
        users::get_remote_client(&self.db, session_id, user_id).await
    }

    async fn list_synchronized_clients(&self, session_id: &str) -> Result<Vec<RemoteClient>> {
        users::list_synchronized_clients(&self.db, session_id).await
    }

    async fn set_synchronized(&self, session_id: &str, user_id: &str, synchronized: bool) -> Result<()> {
        users::set_synchronized(&self.db, session_id, user_id, synchronized).await
    }

    async fn increment_user_score(&self, user_id: &str, delta: i64) -> Result<()> {
        users::increment_user_score(&self.db, user_id, delta).await
    }

    async fn list_users(&self, session_id: &str) -> Result<Vec<UserSummary>> {
        users::list_users(&self.db, session_id).await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        sessions::create_session(&self.db, session_id, now).await
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        sessions::session_exists(&self.db, session_id).await
    }

    async fn list_session_ids(&self) -> Result<Vec<String>> {
        sessions::list_session_ids(&self.db).await
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        sessions::touch_session(&self.db, session_id, now).await
    }

    async fn list_expired_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        sessions::list_expired_sessions(&self.db, cutoff).await
    }

    async fn delete_sessions(&self, session_ids: &[String]) -> Result<u64> {
        sessions::delete_sessions(&self.db, session_ids).await
    }
}

/// Storage trait objects shared by the engine, controller, collector and API
#[derive(Clone)]
pub struct Stores {
    pub queue: Arc<dyn QueueStore>,
    pub players: Arc<dyn PlayerStore>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    /// All collaborators backed by one SQLite pool
    pub fn sqlite(db: SqlitePool) -> Self {
        let store = Arc::new(SqliteStore::new(db));
        Self {
            queue: store.clone(),
            players: store.clone(),
            users: store.clone(),
            sessions: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::{Membership, VoteTransition};
    use jukebox_common::time::now;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_stores() -> Stores {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init::init_schema(&pool).await.unwrap();
        Stores::sqlite(pool)
    }

    fn user(id: &str, session_id: &str, token: Option<&str>) -> NewUser {
        NewUser {
            id: id.to_string(),
            session_id: session_id.to_string(),
            username: id.to_uppercase(),
            is_admin: false,
            auth_token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_new_session_has_empty_player_state() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();

        let state = stores.players.get_player_state("s1").await.unwrap();
        assert!(state.current_song.is_none());
        assert!(state.is_empty());
        assert!(stores.sessions.session_exists("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let stores = setup_stores().await;
        let result = stores.players.get_player_state("missing").await;
        assert!(matches!(result, Err(crate::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_player_state_round_trip() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();

        let song = Song::suggested("t1", "One", vec!["A".into()], 10_000, "alice");
        let state = PlayerState::started(song, now());
        stores.players.set_player_state("s1", &state).await.unwrap();

        assert_eq!(stores.players.get_player_state("s1").await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_conditional_pause_and_resume() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();

        // Nothing to pause without a song
        assert!(!stores.players.set_paused("s1", now()).await.unwrap());

        let start = now() - chrono::Duration::seconds(10);
        let song = Song::suggested("t1", "One", vec![], 60_000, "alice");
        stores
            .players
            .set_player_state("s1", &PlayerState::started(song, start))
            .await
            .unwrap();

        let pause_at = start + chrono::Duration::seconds(4);
        assert!(stores.players.set_paused("s1", pause_at).await.unwrap());
        assert!(!stores.players.set_paused("s1", pause_at).await.unwrap());

        let resume_at = pause_at + chrono::Duration::seconds(3);
        assert!(stores.players.set_playing("s1", resume_at).await.unwrap());
        assert!(!stores.players.set_playing("s1", resume_at).await.unwrap());

        let state = stores.players.get_player_state("s1").await.unwrap();
        assert!(!state.paused);
        assert_eq!(state.pause_duration_ms, 3000);
        assert_eq!(state.progress_ms_at(resume_at), 4000);
    }

    #[tokio::test]
    async fn test_increment_progress_moves_clock() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();

        let start = now();
        let song = Song::suggested("t1", "One", vec![], 60_000, "alice");
        stores
            .players
            .set_player_state("s1", &PlayerState::started(song, start))
            .await
            .unwrap();

        stores.players.increment_progress("s1", 5000).await.unwrap();
        let state = stores.players.get_player_state("s1").await.unwrap();
        assert_eq!(state.progress_ms_at(start), 5000);
    }

    #[tokio::test]
    async fn test_duplicate_song_is_rejected() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();

        let song = Song::suggested("t1", "One", vec![], 1000, "alice");
        stores.queue.add_song("s1", &song).await.unwrap();
        let result = stores.queue.add_song("s1", &song).await;
        assert!(matches!(result, Err(crate::Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_add_song_to_unknown_session() {
        let stores = setup_stores().await;
        let song = Song::suggested("t1", "One", vec![], 1000, "alice");
        let result = stores.queue.add_song("nope", &song).await;
        assert!(matches!(result, Err(crate::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_song_round_trip_keeps_voters() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();

        let mut song = Song::suggested("t1", "One", vec!["A".into(), "B".into()], 1000, "alice");
        song.downvoters.insert("bob".to_string());
        song.score = 0;
        stores.queue.add_song("s1", &song).await.unwrap();

        assert_eq!(stores.queue.get_song("s1", "t1").await.unwrap(), song);
    }

    #[tokio::test]
    async fn test_vote_transition_precondition() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();
        stores
            .queue
            .add_song("s1", &Song::suggested("t1", "One", vec![], 1000, "alice"))
            .await
            .unwrap();

        let add_up = VoteTransition { from: Membership::Neither, to: Membership::Upvoted, delta: 1 };
        let flip_down = VoteTransition { from: Membership::Downvoted, to: Membership::Upvoted, delta: 2 };

        // alice already upvoted as suggester
        assert!(!stores.queue.apply_vote_transition("s1", "t1", "alice", &add_up).await.unwrap());
        assert!(stores.queue.apply_vote_transition("s1", "t1", "bob", &add_up).await.unwrap());
        assert!(!stores.queue.apply_vote_transition("s1", "t1", "bob", &flip_down).await.unwrap());

        let song = stores.queue.get_song("s1", "t1").await.unwrap();
        assert_eq!(song.score, 2);
        assert!(song.upvoters.contains("bob"));

        // Missing song never matches
        assert!(!stores.queue.apply_vote_transition("s1", "gone", "bob", &add_up).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_song_deletes_votes() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();
        stores
            .queue
            .add_song("s1", &Song::suggested("t1", "One", vec![], 1000, "alice"))
            .await
            .unwrap();

        stores.queue.remove_song("s1", "t1").await.unwrap();
        assert!(stores.queue.list_songs_ordered("s1").await.unwrap().is_empty());
        assert!(matches!(
            stores.queue.remove_song("s1", "t1").await,
            Err(crate::Error::NotFound(_))
        ));

        // Re-suggesting starts from a clean vote set
        stores
            .queue
            .add_song("s1", &Song::suggested("t1", "One", vec![], 1000, "bob"))
            .await
            .unwrap();
        let song = stores.queue.get_song("s1", "t1").await.unwrap();
        assert_eq!(song.upvoters.len(), 1);
        assert!(song.upvoters.contains("bob"));
    }

    #[tokio::test]
    async fn test_remote_clients_and_synchronization() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();
        stores.users.add_user(&user("alice", "s1", Some("tok-a"))).await.unwrap();
        stores.users.add_user(&user("bob", "s1", None)).await.unwrap();

        assert!(stores.users.list_synchronized_clients("s1").await.unwrap().is_empty());

        stores.users.set_synchronized("s1", "alice", true).await.unwrap();
        stores.users.set_synchronized("s1", "bob", true).await.unwrap();

        // bob has no provider token, so no remote client
        let clients = stores.users.list_synchronized_clients("s1").await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].user_id, "alice");
        assert_eq!(clients[0].auth_token, "tok-a");

        assert!(matches!(
            stores.users.get_remote_client("s1", "bob").await,
            Err(crate::Error::NotFound(_))
        ));
        assert!(matches!(
            stores.users.set_synchronized("s1", "carol", true).await,
            Err(crate::Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_user_lookups_are_scoped_to_session() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();
        stores.sessions.create_session("s2", now()).await.unwrap();
        stores.users.add_user(&user("alice", "s1", Some("tok-a"))).await.unwrap();

        assert!(matches!(
            stores.users.get_remote_client("s2", "alice").await,
            Err(crate::Error::NotFound(_))
        ));
        assert!(matches!(
            stores.users.set_synchronized("s2", "alice", true).await,
            Err(crate::Error::NotFound(_))
        ));
        assert!(!stores.users.get_remote_client("s1", "alice").await.unwrap().synchronized);
    }

    #[tokio::test]
    async fn test_user_score_and_listing() {
        let stores = setup_stores().await;
        stores.sessions.create_session("s1", now()).await.unwrap();
        stores.users.add_user(&user("alice", "s1", None)).await.unwrap();
        stores.users.add_user(&user("bob", "s1", None)).await.unwrap();

        stores.users.increment_user_score("bob", 3).await.unwrap();
        stores.users.increment_user_score("alice", -1).await.unwrap();

        let users = stores.users.list_users("s1").await.unwrap();
        assert_eq!(users[0].user_id, "bob");
        assert_eq!(users[0].score, 3);
        assert_eq!(users[1].score, -1);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_deleted_with_their_data() {
        let stores = setup_stores().await;
        let old = now() - chrono::Duration::days(2);
        stores.sessions.create_session("old", old).await.unwrap();
        stores.sessions.create_session("fresh", now()).await.unwrap();
        stores.users.add_user(&user("alice", "old", None)).await.unwrap();
        stores
            .queue
            .add_song("old", &Song::suggested("t1", "One", vec![], 1000, "alice"))
            .await
            .unwrap();

        let cutoff = now() - chrono::Duration::days(1);
        let expired = stores.sessions.list_expired_sessions(cutoff).await.unwrap();
        assert_eq!(expired, vec!["old".to_string()]);

        assert_eq!(stores.sessions.delete_sessions(&expired).await.unwrap(), 1);
        assert_eq!(stores.sessions.list_session_ids().await.unwrap(), vec!["fresh".to_string()]);
        assert!(stores.queue.list_songs_ordered("old").await.unwrap().is_empty());
        assert!(stores.users.list_users("old").await.unwrap().is_empty());
        assert!(matches!(
            stores.players.get_player_state("old").await,
            Err(crate::Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_touch_keeps_session_alive() {
        let stores = setup_stores().await;
        stores
            .sessions
            .create_session("s1", now() - chrono::Duration::days(2))
            .await
            .unwrap();
        stores.sessions.touch_session("s1", now()).await.unwrap();

        let cutoff = now() - chrono::Duration::days(1);
        assert!(stores.sessions.list_expired_sessions(cutoff).await.unwrap().is_empty());
        assert!(matches!(
            stores.sessions.touch_session("missing", now()).await,
            Err(crate::Error::NotFound(_))
        ));
    }
}
