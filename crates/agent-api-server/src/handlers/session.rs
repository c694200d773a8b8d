use std::sync::Arc;

use axum::{extract::Extension, Json};

use crate::models::chat::{
    QueueStatusResponse, SessionStatusResponse, StartSessionRequest, StartSessionResponse,
};
use crate::services::session::{SessionManager, StartOutcome};
use crate::utils::error::ApiError;

pub async fn start_session_handler(
    Extension(sessions): Extension<Arc<SessionManager>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let session_id = request.session_id.trim().to_string();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest(
            "Missing 'session_id' in request body".to_string(),
        ));
    }

    match sessions.start_session(&session_id).await? {
        StartOutcome::Created => Ok(Json(StartSessionResponse {
            status: "created".to_string(),
            detail: format!("Session [{}] created successfully", session_id),
            queue_position: None,
        })),
        StartOutcome::Queued { position } => Ok(Json(StartSessionResponse {
            status: "queued".to_string(),
            detail: format!(
                "All {} session slots are busy. Your request has been queued.",
                sessions.capacity()
            ),
            queue_position: Some(position),
        })),
    }
}

pub async fn queue_status_handler(
    Extension(sessions): Extension<Arc<SessionManager>>,
) -> Json<QueueStatusResponse> {
    Json(QueueStatusResponse {
        queued: sessions.queued_ids(),
    })
}

pub async fn session_status_handler(
    Extension(sessions): Extension<Arc<SessionManager>>,
) -> Json<SessionStatusResponse> {
    Json(SessionStatusResponse {
        active_sessions: sessions.active_ids(),
    })
}
