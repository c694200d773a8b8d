use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures at the agent-runtime boundary.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent construction failed: {0}")]
    Construction(String),

    #[error("Agent conversation failed: {0}")]
    Conversation(String),
}

/// Failures of the session core. At-capacity is not represented here:
/// a queued admission is an outcome, not an error.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session id '{0}' is already in use")]
    DuplicateId(String),

    #[error("No session found for id '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Agent error: {0}")]
    AgentError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match &err {
            SessionError::DuplicateId(_) => ApiError::BadRequest(err.to_string()),
            SessionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            SessionError::Agent(_) => ApiError::AgentError(err.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::AgentError(msg) => {
                tracing::error!("Agent error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "AgentError", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
