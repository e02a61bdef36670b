use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use rusqlite::Connection;
use serde_json::Value;

use crate::api::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    pub data_dir: PathBuf,
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(conn: Connection, data_dir: PathBuf, session_ttl: chrono::Duration) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            data_dir,
            session_ttl,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads").join("flowcharts")
    }

    /// Runs `f` against the shared connection on a blocking thread. The lock
    /// is held for the whole closure, so a handler's statements never
    /// interleave with another request's.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            // A panicking handler leaves the connection itself intact; any
            // transaction it held was rolled back when it unwound.
            let mut conn = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| ApiError::Storage(e.into()))?
    }
}

/// JSON request body as a loose `Value`. An empty body reads as `{}` so that
/// missing fields surface as field-level validation messages.
pub struct JsonBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(JsonBody(Value::Object(Default::default())));
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::validation(format!("invalid JSON body: {e}")))?;
        if !value.is_object() {
            return Err(ApiError::validation("request body must be a JSON object"));
        }
        Ok(JsonBody(value))
    }
}

/// The single integer path parameter of `/things/{id}` routes.
pub struct IdParam(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for IdParam {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        raw.trim()
            .parse::<i64>()
            .map(IdParam)
            .map_err(|_| ApiError::validation(format!("invalid id: {raw}")))
    }
}
