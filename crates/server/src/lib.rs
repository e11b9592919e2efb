//! EchoAI server
//!
//! WebSocket transport for the spoken-conversation pipeline plus a small
//! REST surface for session management, health, and metrics.

pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler};
pub use session::{Session, SessionManager};
pub use state::AppState;
pub use websocket::{ClientMessage, ServerMessage};

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session capacity reached")]
    Capacity,

    #[error("session already has a live connection")]
    ConnectionConflict,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::SessionNotFound(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Capacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::ConnectionConflict => axum::http::StatusCode::CONFLICT,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let message = self.to_string();
        let status: axum::http::StatusCode = self.into();
        (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
    }
}
