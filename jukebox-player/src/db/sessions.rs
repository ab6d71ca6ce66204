//! Session lifecycle queries

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use jukebox_common::time::to_millis;
use sqlx::{Pool, Sqlite};

use super::players;

/// Create a session together with its empty player row
pub async fn create_session(db: &Pool<Sqlite>, session_id: &str, now: DateTime<Utc>) -> Result<()> {
    let mut tx = db.begin().await?;

    let result = sqlx::query("INSERT INTO sessions (id, created_at, last_active) VALUES (?, ?, ?)")
        .bind(session_id)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(Error::InvalidInput(format!("session {} already exists", session_id)));
        }
        Err(e) => return Err(e.into()),
    }

    players::insert_empty(&mut tx, session_id).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn session_exists(db: &Pool<Sqlite>, session_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?)")
        .bind(session_id)
        .fetch_one(db)
        .await?;
    Ok(exists)
}

pub async fn list_session_ids(db: &Pool<Sqlite>) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar("SELECT id FROM sessions ORDER BY created_at")
        .fetch_all(db)
        .await?;
    Ok(ids)
}

/// Record activity so the garbage collector keeps the session
pub async fn touch_session(db: &Pool<Sqlite>, session_id: &str, now: DateTime<Utc>) -> Result<()> {
    let result = sqlx::query("UPDATE sessions SET last_active = ? WHERE id = ?")
        .bind(to_millis(now))
        .bind(session_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("session {}", session_id)));
    }
    Ok(())
}

/// Sessions whose last activity is older than `cutoff`
pub async fn list_expired_sessions(db: &Pool<Sqlite>, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar("SELECT id FROM sessions WHERE last_active < ? ORDER BY last_active")
        .bind(to_millis(cutoff))
        .fetch_all(db)
        .await?;
    Ok(ids)
}

/// Delete sessions and everything scoped to them
///
/// Returns the number of sessions removed.
pub async fn delete_sessions(db: &Pool<Sqlite>, session_ids: &[String]) -> Result<u64> {
    let mut tx = db.begin().await?;
    let mut deleted = 0;

    for session_id in session_ids {
        for statement in [
            "DELETE FROM votes WHERE session_id = ?",
            "DELETE FROM songs WHERE session_id = ?",
            "DELETE FROM users WHERE session_id = ?",
            "DELETE FROM player_states WHERE session_id = ?",
        ] {
            sqlx::query(statement).bind(session_id).execute(&mut *tx).await?;
        }

        deleted += sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;
    Ok(deleted)
}
