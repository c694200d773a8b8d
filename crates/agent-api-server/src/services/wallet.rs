use std::path::PathBuf;

use tracing::{debug, warn};

/// Persists the opaque wallet blob the agent runtime exports after each
/// construction. The blob is never interpreted here, only carried between
/// constructions so the runtime can reuse the same wallet.
#[derive(Debug, Clone)]
pub struct WalletStore {
    path: PathBuf,
}

impl WalletStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the persisted blob, if any. Read failures are logged and
    /// treated as "no wallet yet"; construction proceeds with a fresh one.
    pub async fn load(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if !data.trim().is_empty() => Some(data),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Error reading wallet file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Persist the exported blob. Best-effort: a write failure costs a
    /// wallet reuse on the next construction, not a request.
    pub async fn persist(&self, blob: &str) {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!("Failed to create wallet directory: {}", e);
                    return;
                }
            }
        }

        match tokio::fs::write(&self.path, blob).await {
            Ok(()) => debug!("Wallet data persisted to {}", self.path.display()),
            Err(e) => warn!("Failed to persist wallet data: {}", e),
        }
    }
}
