use std::sync::Arc;
use std::time::Instant;

use axum::{extract::Extension, Json};
use chrono::Utc;
use tracing::info;

use crate::config::Settings;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::models::chat::{ChatRequest, ResponseMetadata, SendMessageResponse};
use crate::services::session::{SendOutcome, SessionManager};
use crate::utils::error::ApiError;
use crate::utils::parse_reply;

pub async fn send_message_handler(
    Extension(sessions): Extension<Arc<SessionManager>>,
    Extension(logger): Extension<ActivityLogger>,
    Extension(settings): Extension<Arc<Settings>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let start_time = Instant::now();

    let session_id = request.session_id.trim().to_string();
    if session_id.is_empty() {
        return Err(ApiError::BadRequest(
            "Missing 'session_id' in request body".to_string(),
        ));
    }
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Missing 'message' in request body".to_string(),
        ));
    }

    // Cap the user message before it reaches the agent.
    let trimmed: String = request
        .message
        .chars()
        .take(settings.sessions.max_message_chars)
        .collect();

    info!(
        "Chat request: session={}, message_len={}",
        session_id,
        trimmed.len()
    );
    logger.log(
        ActivityLog::builder(&session_id, ActivityType::RequestReceived)
            .status(ActivityStatus::Info)
            .message(&trimmed)
            .build(),
    );

    let payload = format!(
        "{}\n\n{}",
        settings.prompts.base_instructions,
        settings.prompts.mode_wrapper.replace("{message}", &trimmed)
    );

    match sessions.send_message(&session_id, &payload).await? {
        SendOutcome::Queued { position } => Ok(Json(SendMessageResponse::Queued {
            detail: format!(
                "All {} session slots are busy. Your request has been queued.",
                sessions.capacity()
            ),
            queue_position: position,
        })),
        SendOutcome::Replied(raw) => {
            let parsed = parse_reply(&raw);
            let processing_time = start_time.elapsed().as_millis() as u64;

            logger.log(
                ActivityLog::builder(&session_id, ActivityType::MessageSent)
                    .message(&trimmed)
                    .response(&parsed.response)
                    .mode(&parsed.mode)
                    .processing_time(processing_time)
                    .build(),
            );

            info!(
                "Chat completed: session={}, mode={}, code_blocks={}, {}ms",
                session_id,
                parsed.mode,
                parsed.code_blocks.len(),
                processing_time
            );

            Ok(Json(SendMessageResponse::Ok {
                mode: parsed.mode,
                response: parsed.response,
                code_blocks: parsed.code_blocks,
                metadata: ResponseMetadata {
                    timestamp: Utc::now(),
                    model: settings.agent.model.clone(),
                    session_id,
                    message_id: uuid::Uuid::new_v4().to_string(),
                },
            }))
        }
    }
}
