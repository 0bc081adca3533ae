//! Avatar Agent Server
//!
//! Provides WebSocket and HTTP endpoints for viewers and composes the
//! per-session render pipeline: transcription -> generation -> synthesis ->
//! segment-sequenced rendering with frame relay.

pub mod http;
pub mod metrics;
pub mod session;
pub mod sink;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use session::{Session, SessionManager};
pub use sink::WsViewerSink;
pub use state::AppState;
pub use websocket::WebSocketHandler;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session error: {0}")]
    Session(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Session(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
