use std::path::{Path, PathBuf};
use std::time::Duration;

use flume::{bounded, Receiver, Sender};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::LoggingConfig;

use super::types::ActivityLog;

/// Async activity logger with queue mechanism. Events are appended to a
/// JSON-lines file by a background worker; the caller never waits on IO.
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Option<Sender<ActivityLog>>,
}

impl ActivityLogger {
    /// Initialize logger with a background writer worker
    pub fn new(config: LoggingConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);

        info!(
            "Initializing ActivityLogger: queue={}, batch={}, timeout={}ms, file={}",
            config.queue_capacity, config.batch_size, config.batch_timeout_ms,
            config.activity_log_path
        );

        let path = PathBuf::from(&config.activity_log_path);
        tokio::spawn(async move {
            Self::worker_loop(path, receiver, config).await;
        });

        Self {
            sender: Some(sender),
        }
    }

    /// Logger that discards every event. Used in tests so timer-sensitive
    /// code runs without a background worker on the clock.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Log activity (non-blocking, fire-and-forget)
    pub fn log(&self, activity: ActivityLog) {
        let Some(sender) = &self.sender else { return };
        // Try to send, if queue full, drop with warning
        if let Err(e) = sender.try_send(activity) {
            warn!("Failed to enqueue activity log (queue full?): {}", e);
        }
    }

    /// Worker loop - flushes events in batches
    async fn worker_loop(path: PathBuf, receiver: Receiver<ActivityLog>, config: LoggingConfig) {
        info!("Activity log worker started, writing to {}", path.display());

        let mut batch: Vec<ActivityLog> = Vec::with_capacity(config.batch_size);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms);

        loop {
            // Collect batch
            let deadline = tokio::time::Instant::now() + batch_timeout;

            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(log)) => {
                        batch.push(log);
                    }
                    Ok(Err(_)) => {
                        // Channel closed, flush and exit
                        if !batch.is_empty() {
                            Self::flush_batch(&path, &batch).await;
                        }
                        info!("Activity log worker shutting down (channel closed)");
                        return;
                    }
                    Err(_) => {
                        // Timeout, flush what we have
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                Self::flush_batch(&path, &batch).await;
                batch.clear();
            } else {
                // No events received, sleep a bit to avoid busy loop
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    /// Append a batch as JSON lines
    async fn flush_batch(path: &Path, batch: &[ActivityLog]) {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    error!("Failed to create activity log directory: {}", e);
                    return;
                }
            }
        }

        let mut lines = String::new();
        for log in batch {
            match serde_json::to_string(log) {
                Ok(line) => {
                    lines.push_str(&line);
                    lines.push('\n');
                }
                Err(e) => error!("Failed to serialize activity log: {}", e),
            }
        }

        match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
        {
            Ok(mut file) => {
                if let Err(e) = file.write_all(lines.as_bytes()).await {
                    error!("Failed to write activity logs: {}", e);
                } else {
                    debug!("Flushed {} activity logs", batch.len());
                }
            }
            Err(e) => error!("Failed to open activity log {}: {}", path.display(), e),
        }
    }
}
