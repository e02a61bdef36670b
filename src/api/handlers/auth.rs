use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::error::{ok, ApiError};
use crate::api::helpers::field_string;
use crate::api::session::{self, AuthUser};
use crate::api::types::{AppState, IdParam, JsonBody};
use crate::password;

struct Credentials {
    user: SessionUser,
    password_hash: String,
}

#[derive(Debug, Serialize)]
pub struct SessionUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub user_role: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSession {
    pub user: SessionUser,
    pub token: String,
    pub expires_at: String,
}

fn credentials_by_email(conn: &Connection, email: &str) -> Result<Option<Credentials>, ApiError> {
    Ok(conn
        .query_row(
            "SELECT id, name, email, user_role, password_hash FROM users WHERE email = ?",
            [email],
            |r| {
                Ok(Credentials {
                    user: SessionUser {
                        id: r.get(0)?,
                        name: r.get(1)?,
                        email: r.get(2)?,
                        user_role: r.get(3)?,
                    },
                    password_hash: r.get(4)?,
                })
            },
        )
        .optional()?)
}

fn rejected() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".into())
}

/// Checks the credentials. The account is read under the database lock and
/// the password verified on the blocking pool after the lock is released.
/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn authenticate(state: &AppState, email: String, password: String) -> Result<SessionUser, ApiError> {
    let found = state
        .with_db(move |conn| credentials_by_email(conn, &email))
        .await?
        .ok_or_else(rejected)?;
    if !password::verify_off_thread(password, found.password_hash).await? {
        return Err(rejected());
    }
    Ok(found.user)
}

/// Authenticates, then opens a session in a second lock acquisition.
pub async fn login(state: &AppState, email: String, password: String) -> Result<LoginSession, ApiError> {
    let user = authenticate(state, email, password).await?;
    let ttl = state.session_ttl;
    let user_id = user.id;
    let (token, expires_at) = state
        .with_db(move |conn| session::create_session(conn, user_id, ttl))
        .await?;
    Ok(LoginSession {
        user,
        token,
        expires_at,
    })
}

pub fn profile(conn: &Connection, user_id: i64) -> Result<Value, ApiError> {
    conn.query_row(
        "SELECT id, name, roll_no, year_of_study, department, college_name,
                mobile_no, email, user_role, created_at
         FROM users WHERE id = ?",
        [user_id],
        |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "name": r.get::<_, String>(1)?,
                "roll_no": r.get::<_, Option<String>>(2)?,
                "year_of_study": r.get::<_, Option<i64>>(3)?,
                "department": r.get::<_, Option<String>>(4)?,
                "college_name": r.get::<_, Option<String>>(5)?,
                "mobile_no": r.get::<_, String>(6)?,
                "email": r.get::<_, String>(7)?,
                "user_role": r.get::<_, i64>(8)?,
                "created_at": r.get::<_, String>(9)?,
            }))
        },
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("User not found"))
}

async fn login_post(State(state): State<AppState>, JsonBody(body): JsonBody) -> Result<Json<Value>, ApiError> {
    let (Some(email), Some(password)) = (field_string(&body, "email"), field_string(&body, "password")) else {
        return Err(ApiError::validation("Email and password are required"));
    };
    let log_email = email.clone();
    let result = login(&state, email, password).await;
    match result {
        Ok(session) => {
            tracing::info!(user_id = session.user.id, "login");
            Ok(ok(json!({
                "message": "Login successful",
                "user": session.user,
                "token": session.token,
                "expiresAt": session.expires_at,
            })))
        }
        Err(e @ ApiError::Unauthorized(_)) => {
            tracing::warn!(email = %log_email, "rejected login");
            Err(e)
        }
        Err(e) => Err(e),
    }
}

async fn logout_post(State(state): State<AppState>, user: AuthUser) -> Result<Json<Value>, ApiError> {
    let token_hash = user.token_hash.clone();
    state
        .with_db(move |conn| session::delete_session(conn, &token_hash))
        .await?;
    tracing::info!(user_id = user.id, "logout");
    Ok(ok(json!({ "message": "Logged out" })))
}

async fn profile_get(
    State(state): State<AppState>,
    user: AuthUser,
    IdParam(user_id): IdParam,
) -> Result<Json<Value>, ApiError> {
    if !user.is_admin() && user.id != user_id {
        return Err(ApiError::Forbidden("Access denied".into()));
    }
    let found = state.with_db(move |conn| profile(conn, user_id)).await?;
    Ok(ok(json!({ "user": found })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login_post))
        .route("/logout", post(logout_post))
        .route("/profile/{id}", get(profile_get))
}
