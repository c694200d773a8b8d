pub mod chat;
pub mod health;
pub mod session;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::config::Settings;
use crate::logging::ActivityLogger;
use crate::services::session::SessionManager;

pub fn router(
    sessions: Arc<SessionManager>,
    logger: ActivityLogger,
    settings: Arc<Settings>,
) -> Router {
    let api_routes = Router::new()
        .route("/api/start-session", post(session::start_session_handler))
        .route("/api/send-message", post(chat::send_message_handler))
        .route("/api/queue-status", get(session::queue_status_handler))
        .route("/api/session-status", get(session::session_status_handler))
        .layer(Extension(sessions))
        .layer(Extension(logger))
        .layer(Extension(settings));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .merge(api_routes)
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        // Body limit (chat payloads only, keep it small)
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
