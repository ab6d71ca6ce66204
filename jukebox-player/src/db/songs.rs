//! Queue storage: songs and their votes
//!
//! Voter sets are rows in `votes` (direction 1 = up, -1 = down). A vote
//! transition is a single transaction whose first statement is the conditional
//! write; `rows_affected == 1` means its membership precondition still held, and
//! only then is the song's score adjusted in the same transaction.

use crate::error::{Error, Result};
use crate::ranking::{Membership, VoteTransition};
use jukebox_common::model::Song;
use jukebox_common::time::{from_millis, to_millis};
use sqlx::{Pool, Sqlite};
use std::collections::{BTreeSet, HashMap};

type SongRow = (String, String, String, i64, String, i64, i64);

/// Insert a song and its initial voter sets
///
/// A song may be suggested only once per session.
pub async fn add_song(db: &Pool<Sqlite>, session_id: &str, song: &Song) -> Result<()> {
    let mut tx = db.begin().await?;

    let session_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?)")
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;
    if !session_exists {
        return Err(Error::NotFound(format!("session {}", session_id)));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO songs (session_id, id, title, artists, duration_ms, suggested_by, score, time_added)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session_id)
    .bind(&song.id)
    .bind(&song.title)
    .bind(serde_json::to_string(&song.artists)?)
    .bind(song.duration_ms)
    .bind(&song.suggested_by)
    .bind(song.score)
    .bind(to_millis(song.time_added))
    .execute(&mut *tx)
    .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(Error::InvalidInput(format!(
                "song {} is already in the queue of session {}",
                song.id, session_id
            )));
        }
        Err(e) => return Err(e.into()),
    }

    let voters = song
        .upvoters
        .iter()
        .map(|user| (user, 1))
        .chain(song.downvoters.iter().map(|user| (user, -1)));
    for (user_id, direction) in voters {
        sqlx::query("INSERT INTO votes (session_id, song_id, user_id, direction) VALUES (?, ?, ?, ?)")
            .bind(session_id)
            .bind(&song.id)
            .bind(user_id)
            .bind(direction)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Delete a song and its votes
pub async fn remove_song(db: &Pool<Sqlite>, session_id: &str, song_id: &str) -> Result<()> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM votes WHERE session_id = ? AND song_id = ?")
        .bind(session_id)
        .bind(song_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM songs WHERE session_id = ? AND id = ?")
        .bind(session_id)
        .bind(song_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("song {} in session {}", song_id, session_id)));
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_song(db: &Pool<Sqlite>, session_id: &str, song_id: &str) -> Result<Song> {
    let row: SongRow = sqlx::query_as(
        r#"
        SELECT id, title, artists, duration_ms, suggested_by, score, time_added
        FROM songs
        WHERE session_id = ? AND id = ?
        "#,
    )
    .bind(session_id)
    .bind(song_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("song {} in session {}", song_id, session_id)))?;

    let votes: Vec<(String, i64)> = sqlx::query_as(
        "SELECT user_id, direction FROM votes WHERE session_id = ? AND song_id = ?",
    )
    .bind(session_id)
    .bind(song_id)
    .fetch_all(db)
    .await?;

    let mut song = song_from_row(row)?;
    for (user_id, direction) in votes {
        add_voter(&mut song, user_id, direction);
    }
    Ok(song)
}

/// All songs of a session in queue order (score desc, time added asc)
pub async fn list_songs_ordered(db: &Pool<Sqlite>, session_id: &str) -> Result<Vec<Song>> {
    let rows: Vec<SongRow> = sqlx::query_as(
        r#"
        SELECT id, title, artists, duration_ms, suggested_by, score, time_added
        FROM songs
        WHERE session_id = ?
        "#,
    )
    .bind(session_id)
    .fetch_all(db)
    .await?;

    let votes: Vec<(String, String, i64)> = sqlx::query_as(
        "SELECT song_id, user_id, direction FROM votes WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_all(db)
    .await?;

    let mut songs = rows
        .into_iter()
        .map(|row| song_from_row(row).map(|song| (song.id.clone(), song)))
        .collect::<Result<HashMap<_, _>>>()?;

    for (song_id, user_id, direction) in votes {
        if let Some(song) = songs.get_mut(&song_id) {
            add_voter(song, user_id, direction);
        }
    }

    let mut songs: Vec<Song> = songs.into_values().collect();
    songs.sort_by(Song::rank_cmp);
    Ok(songs)
}

/// Apply one vote transition if its membership precondition holds
///
/// Returns `false` when the precondition did not match (nothing was changed).
pub async fn apply_vote_transition(
    db: &Pool<Sqlite>,
    session_id: &str,
    song_id: &str,
    user_id: &str,
    transition: &VoteTransition,
) -> Result<bool> {
    let mut tx = db.begin().await?;

    let rows_affected = match (transition.from.direction(), transition.to.direction()) {
        // Neither -> voted: only if the song exists and the user has no vote yet
        (None, Some(to)) => sqlx::query(
            r#"
            INSERT INTO votes (session_id, song_id, user_id, direction)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM songs WHERE session_id = ? AND id = ?)
              AND NOT EXISTS (
                  SELECT 1 FROM votes WHERE session_id = ? AND song_id = ? AND user_id = ?
              )
            "#,
        )
        .bind(session_id)
        .bind(song_id)
        .bind(user_id)
        .bind(to)
        .bind(session_id)
        .bind(song_id)
        .bind(session_id)
        .bind(song_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected(),

        // Voted -> neither
        (Some(from), None) => sqlx::query(
            "DELETE FROM votes WHERE session_id = ? AND song_id = ? AND user_id = ? AND direction = ?",
        )
        .bind(session_id)
        .bind(song_id)
        .bind(user_id)
        .bind(from)
        .execute(&mut *tx)
        .await?
        .rows_affected(),

        // Flip
        (Some(from), Some(to)) => sqlx::query(
            "UPDATE votes SET direction = ? WHERE session_id = ? AND song_id = ? AND user_id = ? AND direction = ?",
        )
        .bind(to)
        .bind(session_id)
        .bind(song_id)
        .bind(user_id)
        .bind(from)
        .execute(&mut *tx)
        .await?
        .rows_affected(),

        (None, None) => 0,
    };

    if rows_affected != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    let updated = sqlx::query("UPDATE songs SET score = score + ? WHERE session_id = ? AND id = ?")
        .bind(transition.delta)
        .bind(session_id)
        .bind(song_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if updated != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    tx.commit().await?;
    Ok(true)
}

fn song_from_row(row: SongRow) -> Result<Song> {
    let (id, title, artists, duration_ms, suggested_by, score, time_added) = row;
    Ok(Song {
        id,
        title,
        artists: serde_json::from_str(&artists)?,
        duration_ms,
        suggested_by,
        score,
        upvoters: BTreeSet::new(),
        downvoters: BTreeSet::new(),
        time_added: from_millis(time_added),
    })
}

fn add_voter(song: &mut Song, user_id: String, direction: i64) {
    match Membership::from_direction(direction) {
        Membership::Upvoted => {
            song.upvoters.insert(user_id);
        }
        Membership::Downvoted => {
            song.downvoters.insert(user_id);
        }
        Membership::Neither => {}
    }
}
