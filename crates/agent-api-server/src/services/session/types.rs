use std::sync::Arc;
use std::time::Instant;

use tokio::task::AbortHandle;

use crate::services::agent_service::AgentHandle;

/// A live binding between a client-chosen session id and a constructed
/// agent handle.
pub struct Session {
    /// Opaque agent instance; owned exclusively by this session.
    pub handle: Arc<dyn AgentHandle>,

    /// Updated on every accepted interaction.
    pub last_active: Instant,

    /// The one scheduled expiry callback this session owns.
    pub expiry_timer: ExpiryTimer,

    /// Bumped on every timer reschedule. A fired timer carrying an older
    /// epoch lost the race against a reset and must not evict the session.
    pub epoch: u64,

    /// Serializes in-flight sends for this id.
    pub send_lock: Arc<tokio::sync::Mutex<()>>,

    pub created_at: Instant,
}

/// Abort handle for a session's pending expiry task.
///
/// Cancellation is explicit (on reschedule) rather than on drop: the expiry
/// task removes its own session record, and an abort-on-drop there would
/// kill the task mid-drain.
pub struct ExpiryTimer {
    abort: AbortHandle,
}

impl ExpiryTimer {
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort }
    }

    pub fn cancel(&self) {
        self.abort.abort();
    }
}

/// Outcome of an admission attempt. Queued is a deferral, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Created,
    Queued { position: usize },
}

/// Outcome of a message send. Queued surfaces when auto-creation ran into
/// exhausted capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Replied(String),
    Queued { position: usize },
}
