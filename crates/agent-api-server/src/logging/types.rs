use chrono::{DateTime, Utc};
use serde::Serialize;

/// Activity type categories
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    RequestReceived,   // Log initial payload
    MessageSent,       // Log final completion
    SessionCreated,
    SessionQueued,
    SessionAdmitted,   // Admitted from the queue after a slot freed
    SessionExpired,
    AdmissionDropped,  // Retry budget exhausted during drain
    AgentError,
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RequestReceived => "request_received",
            Self::MessageSent => "message_sent",
            Self::SessionCreated => "session_created",
            Self::SessionQueued => "session_queued",
            Self::SessionAdmitted => "session_admitted",
            Self::SessionExpired => "session_expired",
            Self::AdmissionDropped => "admission_dropped",
            Self::AgentError => "agent_error",
        }
    }
}

/// Activity status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
    Warning,
    Info,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Complete activity log entry, written as one JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityLog {
    pub session_id: String,

    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_sessions: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Create builder for fluent API
    pub fn builder(session_id: impl Into<String>, activity_type: ActivityType) -> ActivityLogBuilder {
        ActivityLogBuilder::new(session_id.into(), activity_type)
    }
}

/// Builder pattern for ActivityLog
pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    pub fn new(session_id: String, activity_type: ActivityType) -> Self {
        Self {
            log: ActivityLog {
                session_id,
                activity_type,
                activity_status: ActivityStatus::Success,
                message_content: None,
                response_content: None,
                mode: None,
                queue_depth: None,
                active_sessions: None,
                processing_time_ms: None,
                error_message: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.log.activity_status = status;
        self
    }

    pub fn message(mut self, content: impl Into<String>) -> Self {
        self.log.message_content = Some(content.into());
        self
    }

    pub fn response(mut self, content: impl Into<String>) -> Self {
        self.log.response_content = Some(content.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.log.mode = Some(mode.into());
        self
    }

    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.log.queue_depth = Some(depth);
        self
    }

    pub fn active_sessions(mut self, count: usize) -> Self {
        self.log.active_sessions = Some(count);
        self
    }

    pub fn processing_time(mut self, ms: u64) -> Self {
        self.log.processing_time_ms = Some(ms);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}
