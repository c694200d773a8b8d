use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub status: String, // created | queued
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendMessageResponse {
    Ok {
        mode: String,
        response: String,
        code_blocks: Vec<String>,
        metadata: ResponseMetadata,
    },
    Queued {
        detail: String,
        queue_position: usize,
    },
}

#[derive(Debug, Serialize)]
pub struct ResponseMetadata {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub session_id: String,
    pub message_id: String,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub queued: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub active_sessions: Vec<String>,
}
