//! HTTP endpoints
//!
//! REST surface for session management plus health, readiness, and
//! metrics.

use axum::extract::{Json, Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use echoai_core::Turn;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::ws_handler;
use crate::ServerError;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.config.server.cors_origins,
        state.config.server.cors_enabled,
    );

    Router::new()
        // Session endpoints
        .route("/api/sessions", post(create_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id", delete(delete_session))
        // Health checks
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // WebSocket
        .route("/ws/:session_id", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins.
///
/// - If cors_enabled is false, returns a permissive layer (dev only)
/// - If no valid origin is configured, defaults to localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let value = origin.parse::<HeaderValue>().ok();
            if value.is_none() {
                warn!(origin = %origin, "invalid CORS origin, skipping");
            }
            value
        })
        .collect();

    if parsed.is_empty() {
        info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin(
                HeaderValue::from_static("http://localhost:3000"),
            )
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any);
    }

    info!(origins = parsed.len(), "CORS configured");
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(true)
}

#[derive(Debug, Serialize)]
struct SessionCreated {
    session_id: String,
    state: String,
    ws_url: String,
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    session_id: String,
    state: String,
    connected: bool,
    turn_count: usize,
    turns: Vec<Turn>,
}

/// `POST /api/sessions`
async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionCreated>), ServerError> {
    let session = state.sessions.create()?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            ws_url: format!("/ws/{}", session.id),
            session_id: session.id.clone(),
            state: session.state().as_str().to_string(),
        }),
    ))
}

/// `GET /api/sessions/:id`
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ServerError> {
    let session = state
        .sessions
        .get(&id)
        .ok_or(ServerError::SessionNotFound(id))?;

    Ok(Json(SessionInfo {
        session_id: session.id.clone(),
        state: session.state().as_str().to_string(),
        connected: session.is_connected(),
        turn_count: session.agent.turn_count(),
        turns: session.history(),
    }))
}

/// `DELETE /api/sessions/:id`
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if state.sessions.remove(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::SessionNotFound(id))
    }
}

/// `GET /api/sessions`
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "sessions": sessions,
        "count": sessions.len(),
    }))
}

/// `GET /health` - degraded when a required chain has no providers
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let chains = &state.chains;
    let healthy = !chains.stt.is_empty() && !chains.llm.is_empty() && !chains.tts.is_empty();

    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "sessions": state.sessions.count(),
        "providers": {
            "stt": chains.stt.len(),
            "llm": chains.llm.len(),
            "tts": chains.tts.len(),
            "retriever": chains.retriever.is_some(),
        },
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// `GET /ready` - not ready once session capacity is exhausted
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let ready = state.sessions.has_capacity();
    let body = serde_json::json!({
        "ready": ready,
        "sessions": state.sessions.count(),
        "max_sessions": state.config.server.max_sessions,
    });
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}
