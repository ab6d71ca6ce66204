//! Database pool creation and schema initialization

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Open (creating if needed) the database file and make sure the schema exists
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5)),
        )
        .await?;

    init_schema(&pool).await?;
    info!(path = %db_path.display(), "Database ready");
    Ok(pool)
}

/// Create all tables idempotently
///
/// Voter sets live in `votes`; the primary key keeps a user in at most one of
/// upvoters/downvoters per song. Timestamps are epoch milliseconds.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            last_active INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            session_id TEXT NOT NULL,
            id TEXT NOT NULL,
            title TEXT NOT NULL,
            artists TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            suggested_by TEXT NOT NULL,
            score INTEGER NOT NULL,
            time_added INTEGER NOT NULL,
            PRIMARY KEY (session_id, id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            session_id TEXT NOT NULL,
            song_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            direction INTEGER NOT NULL CHECK (direction IN (1, -1)),
            PRIMARY KEY (session_id, song_id, user_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS player_states (
            session_id TEXT PRIMARY KEY,
            current_song TEXT,
            song_start INTEGER NOT NULL,
            pause_start INTEGER NOT NULL,
            pause_duration_ms INTEGER NOT NULL,
            paused INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            username TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 0,
            auth_token TEXT,
            synchronized INTEGER NOT NULL DEFAULT 0
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_users_session ON users(session_id)",
        "CREATE INDEX IF NOT EXISTS idx_sessions_last_active ON sessions(last_active)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
