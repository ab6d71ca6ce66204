//! HTTP surface: live-update stream and health check

mod sse;

use crate::db::Stores;
use crate::error::Error;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use jukebox_common::events::EventBus;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub stores: Stores,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sessions/:session_id/events", get(sse::session_events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "jukebox-player",
        "version": env!("CARGO_PKG_VERSION"),
        "subscriptions": state.bus.subscription_count().await,
    }))
}

/// Map a domain error onto an HTTP status and body
fn error_response(e: Error) -> (StatusCode, Json<StatusResponse>) {
    let status = match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}
