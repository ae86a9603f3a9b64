//! Task manager: pending queue plus running/completed bookkeeping.
//!
//! A single lock guards all three collections, so an item is always in
//! exactly one of them. Workers block in [`TaskManager::claim`] until work
//! is available; [`TaskManager::finish`] wakes anyone waiting on progress.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, futures::Notified};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::worker::state::WorkStatus;
use crate::worker::task::{ClaimedWork, WorkItem, WorkOutcome, WorkSummary};

#[derive(Default)]
struct ManagerInner {
    pending: VecDeque<WorkItem>,
    running: HashMap<usize, WorkItem>,
    completed: Vec<WorkItem>,
}

/// Thread-safe work queue shared by producers and the worker pool.
pub struct TaskManager {
    inner: Mutex<ManagerInner>,
    /// Signalled once per enqueued item.
    available: Notify,
    /// Signalled to all waiters whenever an item finishes.
    finished: Notify,
}

/// Consistent point-in-time view of the manager, as written to checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub pending: Vec<WorkSummary>,
    pub running: BTreeMap<usize, WorkSummary>,
    pub completed: Vec<WorkSummary>,
}

/// Item counts per collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskManager {
    /// Create a new, empty task manager.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(ManagerInner::default()),
            available: Notify::new(),
            finished: Notify::new(),
        })
    }

    /// Append an item to the pending queue. Returns the item ID.
    pub async fn enqueue(&self, item: WorkItem) -> Uuid {
        let id = item.id;
        let name = item.name.clone();
        let depth = {
            let mut inner = self.inner.lock().await;
            inner.pending.push_back(item);
            inner.pending.len()
        };
        self.available.notify_one();

        debug!(work_id = %id, name = %name, depth, "Enqueued work item");
        id
    }

    /// Wait until an item is pending, then move the queue head to `running`
    /// under `worker_id` and hand its action to the caller.
    ///
    /// Cancel-safe: dropping the future never loses a queued item.
    pub async fn claim(&self, worker_id: usize) -> ClaimedWork {
        loop {
            let notified = self.available.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(mut item) = inner.pending.pop_front() {
                    if let Some(mut stale) = inner.running.remove(&worker_id) {
                        warn!(
                            worker_id,
                            work_id = %stale.id,
                            "Worker claimed new work while still holding an item"
                        );
                        let _ = stale.transition_to(WorkStatus::Failed);
                        stale.error = Some("superseded by a new claim".to_string());
                        inner.completed.push(stale);
                    }

                    let _ = item.transition_to(WorkStatus::Running);
                    let claimed = ClaimedWork {
                        id: item.id,
                        name: item.name.clone(),
                        worker_id,
                        action: item.take_action(),
                    };
                    inner.running.insert(worker_id, item);

                    info!(worker_id, work_id = %claimed.id, name = %claimed.name, "Claimed work item");
                    return claimed;
                }
            }
            notified.await;
        }
    }

    /// Move the worker's running item to `completed` with the given outcome.
    /// A worker with no running item is logged and ignored.
    pub async fn finish(&self, worker_id: usize, outcome: WorkOutcome) {
        let finished = {
            let mut inner = self.inner.lock().await;
            match inner.running.remove(&worker_id) {
                Some(mut item) => {
                    if let Err(e) = item.transition_to(outcome.status()) {
                        warn!(worker_id, error = %e, "Unexpected work item transition");
                    }
                    if let WorkOutcome::Failed(reason) = &outcome {
                        item.error = Some(reason.clone());
                    }
                    let summary = (item.id, item.name.clone(), item.status);
                    inner.completed.push(item);
                    Some(summary)
                }
                None => None,
            }
        };

        match finished {
            Some((id, name, status)) => {
                self.finished.notify_waiters();
                info!(worker_id, work_id = %id, name = %name, status = %status, "Finished work item");
            }
            None => warn!(worker_id, "finish() called with no running item"),
        }
    }

    /// Snapshot all three collections without disturbing queue order.
    pub async fn snapshot(&self) -> TaskSnapshot {
        let inner = self.inner.lock().await;
        TaskSnapshot {
            pending: inner.pending.iter().map(WorkItem::summary).collect(),
            running: inner
                .running
                .iter()
                .map(|(worker_id, item)| (*worker_id, item.summary()))
                .collect(),
            completed: inner.completed.iter().map(WorkItem::summary).collect(),
        }
    }

    /// Number of running items with the given name.
    pub async fn count_running_by_name(&self, name: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.running.values().filter(|t| t.name == name).count()
    }

    /// Number of pending or running items with the given name.
    pub async fn count_outstanding_by_name(&self, name: &str) -> usize {
        let inner = self.inner.lock().await;
        let pending = inner.pending.iter().filter(|t| t.name == name).count();
        let running = inner.running.values().filter(|t| t.name == name).count();
        pending + running
    }

    /// Current counts per collection.
    pub async fn counts(&self) -> TaskCounts {
        let inner = self.inner.lock().await;
        TaskCounts {
            pending: inner.pending.len(),
            running: inner.running.len(),
            completed: inner.completed.len(),
            failed: inner
                .completed
                .iter()
                .filter(|t| t.status == WorkStatus::Failed)
                .count(),
        }
    }

    /// Future resolving on the next `finish()`. Registered on creation, so a
    /// finish that happens before the first poll still wakes it.
    pub fn finished(&self) -> Notified<'_> {
        self.finished.notified()
    }

    /// Wait until nothing is pending or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.finished.notified();
            let counts = self.counts().await;
            if counts.pending == 0 && counts.running == 0 {
                return;
            }
            notified.await;
        }
    }
}
