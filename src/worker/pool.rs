//! Fixed-size worker pool draining the task manager.
//!
//! Each worker loops: check cancellation, claim, execute, finish. An action
//! that errors, panics or exceeds the optional timeout becomes a `failed`
//! completion; the worker itself keeps running. Cancellation is observed
//! only between items, so an in-flight action always runs to the end.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TaskError;
use crate::worker::manager::TaskManager;
use crate::worker::state::WorkerPhase;
use crate::worker::task::{ClaimedWork, WorkOutcome};

/// A running pool of symmetric workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    phases: Arc<RwLock<Vec<WorkerPhase>>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `size` workers pulling from `manager`.
    ///
    /// The pool stops claiming once `cancel` fires, either directly or via
    /// [`WorkerPool::shutdown`].
    pub fn spawn(
        manager: Arc<TaskManager>,
        size: usize,
        action_timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        let phases = Arc::new(RwLock::new(vec![WorkerPhase::Idle; size]));

        let handles = (0..size)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&manager),
                    Arc::clone(&phases),
                    action_timeout,
                    cancel.clone(),
                ))
            })
            .collect();

        info!(workers = size, timeout = ?action_timeout, "Worker pool started");

        Self {
            handles,
            phases,
            cancel,
        }
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Current phase of every worker, indexed by worker ID.
    pub async fn phases(&self) -> Vec<WorkerPhase> {
        self.phases.read().await.clone()
    }

    /// Signal cancellation and wait for every worker to exit. In-flight
    /// actions finish first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(worker_id, error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    manager: Arc<TaskManager>,
    phases: Arc<RwLock<Vec<WorkerPhase>>>,
    action_timeout: Option<Duration>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        set_phase(&phases, worker_id, WorkerPhase::Idle).await;

        let claimed = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            claimed = manager.claim(worker_id) => claimed,
        };

        set_phase(&phases, worker_id, WorkerPhase::Running).await;
        let outcome = execute(claimed, action_timeout).await;
        manager.finish(worker_id, outcome).await;
    }

    set_phase(&phases, worker_id, WorkerPhase::Cancelled).await;
    debug!(worker_id, "Worker cancelled");
}

async fn set_phase(phases: &RwLock<Vec<WorkerPhase>>, worker_id: usize, phase: WorkerPhase) {
    if let Some(slot) = phases.write().await.get_mut(worker_id) {
        *slot = phase;
    }
}

/// Run one claimed item to completion and classify the result.
async fn execute(claimed: ClaimedWork, action_timeout: Option<Duration>) -> WorkOutcome {
    let worker_id = claimed.worker_id;
    let name = claimed.name.clone();
    let work_id = claimed.id;

    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| claimed.run())) {
        Ok(Some(future)) => future,
        Ok(None) => return WorkOutcome::Completed,
        Err(panic) => {
            return fail(worker_id, TaskError::Panicked {
                name,
                reason: panic_message(panic.as_ref()),
            });
        }
    };

    let guarded = AssertUnwindSafe(future).catch_unwind();
    let result = match action_timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(result) => result,
            Err(_) => {
                return fail(worker_id, TaskError::TimedOut {
                    name,
                    timeout: limit,
                });
            }
        },
        None => guarded.await,
    };

    match result {
        Ok(Ok(())) => WorkOutcome::Completed,
        Ok(Err(e)) => {
            error!(worker_id, work_id = %work_id, name = %name, error = %e, "Work item failed");
            WorkOutcome::Failed(e.to_string())
        }
        Err(panic) => fail(worker_id, TaskError::Panicked {
            name,
            reason: panic_message(panic.as_ref()),
        }),
    }
}

fn fail(worker_id: usize, err: TaskError) -> WorkOutcome {
    error!(worker_id, error = %err, "Work item failed");
    WorkOutcome::Failed(err.to_string())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CapabilityError, Error};
    use crate::worker::state::WorkStatus;
    use crate::worker::task::WorkItem;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn failing_action_is_recorded_and_worker_survives() {
        let manager = TaskManager::new();
        manager
            .enqueue(WorkItem::new("generate", || async {
                Err::<(), Error>(CapabilityError::Generation("no ideas".into()).into())
            }))
            .await;
        manager
            .enqueue(WorkItem::new("generate", || async { Ok(()) }))
            .await;

        let pool = WorkerPool::spawn(Arc::clone(&manager), 1, None, CancellationToken::new());
        tokio::time::timeout(TEST_TIMEOUT, manager.wait_idle())
            .await
            .unwrap();

        let snap = manager.snapshot().await;
        assert_eq!(snap.completed[0].status, WorkStatus::Failed);
        assert!(snap.completed[0].error.as_deref().unwrap().contains("no ideas"));
        assert_eq!(snap.completed[1].status, WorkStatus::Completed);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn panicking_action_becomes_failure() {
        let manager = TaskManager::new();
        manager
            .enqueue(WorkItem::new("review", || async {
                if true {
                    panic!("reviewer exploded");
                }
                Ok(())
            }))
            .await;

        let pool = WorkerPool::spawn(Arc::clone(&manager), 1, None, CancellationToken::new());
        tokio::time::timeout(TEST_TIMEOUT, manager.wait_idle())
            .await
            .unwrap();

        let snap = manager.snapshot().await;
        assert_eq!(snap.completed[0].status, WorkStatus::Failed);
        assert!(snap.completed[0].error.as_deref().unwrap().contains("reviewer exploded"));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn action_timeout_fails_item() {
        let manager = TaskManager::new();
        manager
            .enqueue(WorkItem::new("compare", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }))
            .await;

        let pool = WorkerPool::spawn(
            Arc::clone(&manager),
            1,
            Some(Duration::from_millis(20)),
            CancellationToken::new(),
        );
        tokio::time::timeout(TEST_TIMEOUT, manager.wait_idle())
            .await
            .unwrap();

        let snap = manager.snapshot().await;
        assert_eq!(snap.completed[0].status, WorkStatus::Failed);
        assert!(snap.completed[0].error.as_deref().unwrap().contains("timed out"));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_lets_running_action_finish() {
        let manager = TaskManager::new();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        manager
            .enqueue(WorkItem::new("generate", move || async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }))
            .await;

        let pool = WorkerPool::spawn(Arc::clone(&manager), 2, None, CancellationToken::new());
        started_rx.await.unwrap();
        tokio::time::timeout(TEST_TIMEOUT, pool.shutdown())
            .await
            .unwrap();

        let snap = manager.snapshot().await;
        assert!(snap.running.is_empty());
        assert_eq!(snap.completed.len(), 1);
        assert_eq!(snap.completed[0].status, WorkStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_pool_claims_nothing_new() {
        let manager = TaskManager::new();
        let cancel = CancellationToken::new();
        let pool = WorkerPool::spawn(Arc::clone(&manager), 2, None, cancel.clone());
        cancel.cancel();

        let phases_done = async {
            loop {
                if pool.phases().await.iter().all(|p| *p == WorkerPhase::Cancelled) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(TEST_TIMEOUT, phases_done).await.unwrap();

        manager
            .enqueue(WorkItem::new("generate", || async { Ok(()) }))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.counts().await.pending, 1);
        pool.shutdown().await;
    }
}
