//! HTTP Endpoints
//!
//! REST API for viewer session management, health and metrics.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::{self, metrics_handler};
use crate::state::AppState;
use crate::websocket::WebSocketHandler;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        // Session endpoints
        .route("/api/sessions", post(create_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id", delete(delete_session))
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Metrics
        .route("/metrics", get(metrics_handler))
        // Viewer WebSocket
        .route("/ws/:session_id", get(WebSocketHandler::handle))
        // Middleware
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// Create a new viewer session
async fn create_session(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.sessions.create() {
        Ok(session) => {
            metrics::record_session_created();
            Ok(Json(serde_json::json!({
                "session_id": session.id,
                "websocket_url": format!("/ws/{}", session.id),
            })))
        }
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// Get session info, including its frame buffer status
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let session = state.sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;

    let buffer = state.registry.get_buffer(&id).map(|buffer| {
        let status = buffer.status();
        serde_json::json!({
            "occupancy": status.occupancy,
            "capacity": status.capacity,
            "running": status.running,
            "viewer_open": status.viewer_open,
            "overflow_dropped": status.overflow_dropped,
            "delivery_lost": status.delivery_lost,
        })
    });

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "active": session.is_active(),
        "buffer": buffer,
    })))
}

/// Delete a session and release its resources
async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if let Some(session) = state.sessions.get(&id) {
        session.shutdown_pipeline().await;
    }
    state.registry.remove_buffer(&id);
    state.sessions.remove(&id);
    StatusCode::NO_CONTENT
}

/// List session IDs
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "sessions": state.sessions.list(),
        "count": state.sessions.count(),
    }))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Readiness check: the process is ready when it can accept new sessions
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let relay = state.registry.aggregate_status();
    Json(serde_json::json!({
        "status": "ready",
        "sessions": state.sessions.count(),
        "relay": {
            "buffers": relay.total_buffers,
            "frames": relay.total_occupancy,
        },
    }))
}
