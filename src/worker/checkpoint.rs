//! Periodic checkpointing of task manager state.
//!
//! Every tick snapshots the [`TaskManager`] and hands it to a
//! [`CheckpointSink`]. A failed write is logged and the loop carries on.
//!
//! The writer does not flush on cancellation. To capture the terminal state,
//! wait [`drain_delay`] after the last work finishes before cancelling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CheckpointError;
use crate::worker::manager::{TaskManager, TaskSnapshot};

/// Slack added to one interval when waiting for a final checkpoint.
pub const SHUTDOWN_SLACK: Duration = Duration::from_millis(500);

/// Floor for the tick interval; `tokio::time::interval` panics on zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// How long a caller should wait before cancelling the writer so that one
/// more tick captures the current state.
pub fn drain_delay(interval: Duration) -> Duration {
    interval + SHUTDOWN_SLACK
}

/// Durable destination for checkpoints. Each write replaces the previous one.
#[async_trait]
pub trait CheckpointSink: Send + Sync {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<(), CheckpointError>;
}

/// JSON file sink with atomic replace: write a sibling temp file, then rename.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint".to_string());
        self.path.with_file_name(format!(".{file_name}.tmp"))
    }
}

#[async_trait]
impl CheckpointSink for FileSink {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-process sink keeping every written snapshot.
#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<TaskSnapshot>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All snapshots written so far, oldest first.
    pub async fn history(&self) -> Vec<TaskSnapshot> {
        self.writes.lock().await.clone()
    }

    /// The most recent snapshot.
    pub async fn latest(&self) -> Option<TaskSnapshot> {
        self.writes.lock().await.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.writes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.writes.lock().await.is_empty()
    }
}

#[async_trait]
impl CheckpointSink for MemorySink {
    async fn write(&self, snapshot: &TaskSnapshot) -> Result<(), CheckpointError> {
        self.writes.lock().await.push(snapshot.clone());
        Ok(())
    }
}

/// Snapshot the manager once and write it to `sink`.
/// Returns the number of completed items captured.
pub async fn write_checkpoint(
    manager: &TaskManager,
    sink: &dyn CheckpointSink,
) -> Result<usize, CheckpointError> {
    let snapshot = manager.snapshot().await;
    let completed = snapshot.completed.len();
    sink.write(&snapshot).await?;
    debug!(
        pending = snapshot.pending.len(),
        running = snapshot.running.len(),
        completed,
        "Checkpoint written"
    );
    Ok(completed)
}

/// Spawn the periodic checkpoint loop. The first write happens one full
/// interval after spawn. Cancellation is checked between ticks. Intervals
/// below [`MIN_INTERVAL`] are raised to it.
pub fn spawn_checkpoint_writer(
    manager: Arc<TaskManager>,
    sink: Arc<dyn CheckpointSink>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = if interval < MIN_INTERVAL {
        warn!(requested = ?interval, floor = ?MIN_INTERVAL, "Checkpoint interval too small, clamping");
        MIN_INTERVAL
    } else {
        interval
    };

    tokio::spawn(async move {
        info!(interval = ?interval, "Checkpoint writer started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = write_checkpoint(&manager, sink.as_ref()).await {
                warn!(error = %e, "Checkpoint write failed, will retry next tick");
            }
        }

        info!("Checkpoint writer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::task::{WorkItem, WorkOutcome};

    struct FailingSink;

    #[async_trait]
    impl CheckpointSink for FailingSink {
        async fn write(&self, _snapshot: &TaskSnapshot) -> Result<(), CheckpointError> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[tokio::test]
    async fn file_sink_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("task_history.json");
        let sink = FileSink::new(&path);

        let manager = TaskManager::new();
        manager
            .enqueue(WorkItem::new("generate", || async { Ok(()) }))
            .await;
        write_checkpoint(&manager, &sink).await.unwrap();

        let _claimed = manager.claim(0).await;
        manager.finish(0, WorkOutcome::Completed).await;
        write_checkpoint(&manager, &sink).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: TaskSnapshot = serde_json::from_str(&raw).unwrap();
        assert!(parsed.pending.is_empty());
        assert_eq!(parsed.completed.len(), 1);
        assert!(!sink.temp_path().exists());
    }

    #[test]
    fn temp_path_is_sibling() {
        let sink = FileSink::new("/var/lib/cs/task_history.json");
        assert_eq!(
            sink.temp_path(),
            PathBuf::from("/var/lib/cs/.task_history.json.tmp")
        );
    }

    #[tokio::test]
    async fn write_failure_does_not_stop_loop() {
        let manager = TaskManager::new();
        let cancel = CancellationToken::new();
        let handle = spawn_checkpoint_writer(
            Arc::clone(&manager),
            Arc::new(FailingSink),
            Duration::from_millis(5),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!handle.is_finished());
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn zero_interval_is_clamped_not_fatal() {
        let manager = TaskManager::new();
        let cancel = CancellationToken::new();
        let sink = MemorySink::new();
        let handle = spawn_checkpoint_writer(
            Arc::clone(&manager),
            sink.clone(),
            Duration::ZERO,
            cancel.clone(),
        );

        let written = async {
            while sink.len().await < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), written)
            .await
            .unwrap();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn drain_delay_exceeds_interval() {
        let interval = Duration::from_secs(5);
        assert!(drain_delay(interval) > interval);
    }
}
