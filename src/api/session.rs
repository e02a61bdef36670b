use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use rand::RngCore;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::db;

pub const ROLE_ADMIN: i64 = 0;
pub const ROLE_STUDENT: i64 = 1;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: i64,
    pub token_hash: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Only the digest is stored; the raw token exists on the client alone.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn new_token() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Creates a session row and returns `(token, expires_at)`. Expired rows
/// from any user are swept first, so abandoned sessions do not pile up.
pub fn create_session(
    conn: &Connection,
    user_id: i64,
    ttl: chrono::Duration,
) -> Result<(String, String), ApiError> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= strftime('%Y-%m-%dT%H:%M:%fZ','now')",
        [],
    )?;
    let token = new_token();
    let expires_at = db::timestamp(chrono::Utc::now() + ttl);
    conn.execute(
        "INSERT INTO sessions(token_hash, user_id, expires_at) VALUES(?, ?, ?)",
        (hash_token(&token), user_id, &expires_at),
    )?;
    Ok((token, expires_at))
}

pub fn lookup_session(conn: &Connection, token_hash: &str) -> Result<Option<AuthUser>, ApiError> {
    let row = conn
        .query_row(
            "SELECT u.id, u.name, u.email, u.user_role,
                    s.expires_at > strftime('%Y-%m-%dT%H:%M:%fZ','now')
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?",
            [token_hash],
            |r| {
                Ok((
                    AuthUser {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        email: r.get(2)?,
                        role: r.get(3)?,
                        token_hash: token_hash.to_string(),
                    },
                    r.get::<_, bool>(4)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((user, true)) => Ok(Some(user)),
        Some((_, false)) => {
            conn.execute("DELETE FROM sessions WHERE token_hash = ?", [token_hash])?;
            Ok(None)
        }
        None => Ok(None),
    }
}

pub fn delete_session(conn: &Connection, token_hash: &str) -> Result<(), ApiError> {
    conn.execute("DELETE FROM sessions WHERE token_hash = ?", [token_hash])?;
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".into()))?;
        let token_hash = hash_token(&token);
        state
            .with_db(move |conn| lookup_session(conn, &token_hash))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Session expired or invalid".into()))
    }
}

/// An authenticated user with `user_role = 0`.
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".into()));
        }
        Ok(AdminUser(user))
    }
}
