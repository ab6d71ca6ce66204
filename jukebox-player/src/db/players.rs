//! Player state persistence
//!
//! One row per session. Progress is never stored; the row holds the timestamps it
//! is derived from, so a restart reconstructs the clock exactly.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use jukebox_common::model::{PlayerState, Song};
use jukebox_common::time::{from_millis, to_millis};
use sqlx::{Pool, Sqlite, Transaction};

type PlayerRow = (Option<String>, i64, i64, i64, bool);

/// Insert the empty player row for a new session
pub(crate) async fn insert_empty(tx: &mut Transaction<'_, Sqlite>, session_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO player_states (session_id, current_song, song_start, pause_start, pause_duration_ms, paused)
        VALUES (?, NULL, 0, 0, 0, 0)
        "#,
    )
    .bind(session_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn get_player_state(db: &Pool<Sqlite>, session_id: &str) -> Result<PlayerState> {
    let row: PlayerRow = sqlx::query_as(
        r#"
        SELECT current_song, song_start, pause_start, pause_duration_ms, paused
        FROM player_states
        WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

    let (current_song, song_start, pause_start, pause_duration_ms, paused) = row;
    let current_song = current_song
        .map(|json| serde_json::from_str::<Song>(&json))
        .transpose()?;

    Ok(PlayerState {
        current_song,
        song_start: from_millis(song_start),
        pause_start: from_millis(pause_start),
        pause_duration_ms,
        paused,
    })
}

/// Overwrite the whole state (last write wins)
pub async fn set_player_state(db: &Pool<Sqlite>, session_id: &str, state: &PlayerState) -> Result<()> {
    let current_song = state.current_song.as_ref().map(serde_json::to_string).transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE player_states
        SET current_song = ?, song_start = ?, pause_start = ?, pause_duration_ms = ?, paused = ?
        WHERE session_id = ?
        "#,
    )
    .bind(current_song)
    .bind(to_millis(state.song_start))
    .bind(to_millis(state.pause_start))
    .bind(state.pause_duration_ms)
    .bind(state.paused)
    .bind(session_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("session {}", session_id)));
    }
    Ok(())
}

/// Freeze progress at `now` if currently playing a song
///
/// Returns whether the not-paused precondition matched.
pub async fn set_paused(db: &Pool<Sqlite>, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE player_states
        SET paused = 1, pause_start = ?
        WHERE session_id = ? AND paused = 0 AND current_song IS NOT NULL
        "#,
    )
    .bind(to_millis(now))
    .bind(session_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Resume at `now`, folding the elapsed pause into `pause_duration_ms`
///
/// Returns whether the paused precondition matched.
pub async fn set_playing(db: &Pool<Sqlite>, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE player_states
        SET paused = 0, pause_duration_ms = pause_duration_ms + (? - pause_start)
        WHERE session_id = ? AND paused = 1
        "#,
    )
    .bind(to_millis(now))
    .bind(session_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Move progress by `delta_ms` (negative rewinds) without touching the paused flag
pub async fn increment_progress(db: &Pool<Sqlite>, session_id: &str, delta_ms: i64) -> Result<()> {
    let result = sqlx::query(
        "UPDATE player_states SET pause_duration_ms = pause_duration_ms - ? WHERE session_id = ?",
    )
    .bind(delta_ms)
    .bind(session_id)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("session {}", session_id)));
    }
    Ok(())
}
