pub mod manager;
pub mod queue;
pub mod types;

pub use manager::SessionManager;
pub use queue::{AdmissionQueue, QueuedSession};
pub use types::{SendOutcome, StartOutcome};
