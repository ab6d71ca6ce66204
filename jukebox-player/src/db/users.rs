//! User and remote-client queries

use crate::error::{Error, Result};
use jukebox_common::model::{RemoteClient, UserSummary};
use sqlx::{Pool, Sqlite};

/// A user joining a session
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub session_id: String,
    pub username: String,
    pub is_admin: bool,
    /// Provider token; users without one have no remote player
    pub auth_token: Option<String>,
}

pub async fn add_user(db: &Pool<Sqlite>, user: &NewUser) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, session_id, username, is_admin, score, auth_token, synchronized)
        VALUES (?, ?, ?, ?, 0, ?, 0)
        "#,
    )
    .bind(&user.id)
    .bind(&user.session_id)
    .bind(&user.username)
    .bind(user.is_admin)
    .bind(&user.auth_token)
    .execute(db)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(Error::InvalidInput(format!("user {} already exists", user.id)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Remote client of a session user
///
/// NotFound when the user is not in the session or has no provider token.
pub async fn get_remote_client(db: &Pool<Sqlite>, session_id: &str, user_id: &str) -> Result<RemoteClient> {
    let row: Option<(Option<String>, bool)> =
        sqlx::query_as("SELECT auth_token, synchronized FROM users WHERE id = ? AND session_id = ?")
            .bind(user_id)
            .bind(session_id)
            .fetch_optional(db)
            .await?;

    match row {
        Some((Some(auth_token), synchronized)) => Ok(RemoteClient {
            user_id: user_id.to_string(),
            auth_token,
            synchronized,
        }),
        Some((None, _)) => Err(Error::NotFound(format!("remote client for user {}", user_id))),
        None => Err(Error::NotFound(format!("user {} in session {}", user_id, session_id))),
    }
}

pub async fn list_synchronized_clients(db: &Pool<Sqlite>, session_id: &str) -> Result<Vec<RemoteClient>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT id, auth_token
        FROM users
        WHERE session_id = ? AND synchronized = 1 AND auth_token IS NOT NULL
        ORDER BY id
        "#,
    )
    .bind(session_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(user_id, auth_token)| RemoteClient { user_id, auth_token, synchronized: true })
        .collect())
}

pub async fn set_synchronized(
    db: &Pool<Sqlite>,
    session_id: &str,
    user_id: &str,
    synchronized: bool,
) -> Result<()> {
    let result = sqlx::query("UPDATE users SET synchronized = ? WHERE id = ? AND session_id = ?")
        .bind(synchronized)
        .bind(user_id)
        .bind(session_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("user {} in session {}", user_id, session_id)));
    }
    Ok(())
}

/// Add a vote delta to the suggesting user's tally
pub async fn increment_user_score(db: &Pool<Sqlite>, user_id: &str, delta: i64) -> Result<()> {
    let result = sqlx::query("UPDATE users SET score = score + ? WHERE id = ?")
        .bind(delta)
        .bind(user_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

pub async fn list_users(db: &Pool<Sqlite>, session_id: &str) -> Result<Vec<UserSummary>> {
    let rows: Vec<(String, String, bool, i64, bool)> = sqlx::query_as(
        r#"
        SELECT id, username, is_admin, score, synchronized
        FROM users
        WHERE session_id = ?
        ORDER BY score DESC, username
        "#,
    )
    .bind(session_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(user_id, username, is_admin, score, synchronized)| UserSummary {
            user_id,
            username,
            is_admin,
            score,
            synchronized,
        })
        .collect())
}
