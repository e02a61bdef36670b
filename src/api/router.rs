use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;

use super::error::ApiError;
use super::handlers;
use super::types::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(handlers::core::routes())
        .merge(handlers::auth::routes())
        .merge(handlers::students::routes())
        .merge(handlers::content::routes())
        .merge(handlers::questions::routes())
        .merge(handlers::uploads::routes());

    Router::new()
        .nest("/api", api)
        .merge(handlers::uploads::file_routes())
        .fallback(route_not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    let status = resp.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), elapsed_ms, "request");
    } else {
        tracing::debug!(%method, %path, status = status.as_u16(), elapsed_ms, "request");
    }
    resp
}
