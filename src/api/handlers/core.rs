use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::api::error::ok;
use crate::api::types::AppState;

async fn health() -> Json<Value> {
    ok(json!({
        "status": "OK",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
