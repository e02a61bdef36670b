use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::ffi;
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_params",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Storage(_) => "internal",
        }
    }

    /// Storage failures never leak their source to the client.
    fn client_message(&self) -> String {
        match self {
            Self::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(inner, msg) = &e {
            if inner.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || inner.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return Self::Conflict(unique_violation_message(msg.as_deref()).to_string());
            }
        }
        Self::Storage(e.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Storage(e)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.into())
    }
}

fn unique_violation_message(sqlite_msg: Option<&str>) -> &'static str {
    // SQLite reports e.g. "UNIQUE constraint failed: users.email".
    match sqlite_msg {
        Some(m) if m.contains("users.email") => "Email already exists",
        Some(m) if m.contains("users.roll_no") => "Roll number already exists",
        _ => "Duplicate entry found",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Storage(source) = &self {
            tracing::error!("request failed: {source:#}");
        }
        let body = json!({
            "success": false,
            "code": self.code(),
            "message": self.client_message(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Wraps a handler payload in the `{ success: true, ... }` envelope.
pub fn ok(result: Value) -> Json<Value> {
    let mut body = json!({ "success": true });
    if let (Some(out), Value::Object(fields)) = (body.as_object_mut(), result) {
        out.extend(fields);
    }
    Json(body)
}

pub fn created(result: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, ok(result))
}
