use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::api::error::{ok, ApiError};
use crate::api::session::AdminUser;
use crate::api::types::AppState;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const PUBLIC_PREFIX: &str = "/uploads/flowcharts";

const ALLOWED_TYPES: [(&str, &str); 3] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
];

fn default_extension(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(ct, _)| ct.eq_ignore_ascii_case(content_type))
        .map(|(_, ext)| *ext)
}

fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()) {
        Some(e) if e == "png" => "image/png",
        Some(e) if e == "gif" => "image/gif",
        Some(e) if e == "jpg" || e == "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// Builds the stored name. The client's extension is kept when it is a
/// short alphanumeric suffix; anything else falls back to the content type.
pub fn stored_file_name(original: Option<&str>, content_type: &str, millis: i64, random: &str) -> Option<String> {
    let fallback = default_extension(content_type)?;
    let ext = original
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, e)| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| fallback.to_string());
    Some(format!("flowchart-{millis}-{random}.{ext}"))
}

/// A served name must be a single path component.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

async fn upload_flowchart(
    State(state): State<AppState>,
    _admin: AdminUser,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("flowchart") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        let original = field.file_name().map(str::to_string);
        let random = uuid::Uuid::new_v4().simple().to_string();
        let file_name = stored_file_name(
            original.as_deref(),
            &content_type,
            chrono::Utc::now().timestamp_millis(),
            &random[..12],
        )
        .ok_or_else(|| ApiError::validation("Only image files (JPEG, PNG, GIF) are allowed"))?;

        let data = field.bytes().await.map_err(multipart_error)?;
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::PayloadTooLarge("File too large (max 5MB)".into()));
        }

        let dir = state.uploads_dir();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file_name), &data).await?;
        tracing::info!(file = %file_name, bytes = data.len(), "flowchart uploaded");

        return Ok(ok(json!({
            "message": "File uploaded successfully",
            "filePath": format!("{PUBLIC_PREFIX}/{file_name}"),
        })));
    }
    Err(ApiError::validation("No file uploaded"))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File too large (max 5MB)".into())
    } else {
        ApiError::validation(e.body_text())
    }
}

async fn serve_flowchart(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_safe_file_name(&file) {
        return Err(ApiError::not_found("File not found"));
    }
    let bytes = match tokio::fs::read(state.uploads_dir().join(&file)).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("File not found"));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(([(CONTENT_TYPE, content_type_for(&file))], bytes))
}

/// Upload route, mounted under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/upload-flowchart",
        post(upload_flowchart).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024)),
    )
}

/// Public file route, mounted at the root.
pub fn file_routes() -> Router<AppState> {
    Router::new().route("/uploads/flowcharts/{file}", get(serve_flowchart))
}
