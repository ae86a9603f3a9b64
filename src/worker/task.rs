//! Work item types.

use std::future::Future;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::worker::state::WorkStatus;

/// Timestamp format used in snapshots.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Boxed future produced by a work action.
pub type WorkFuture = BoxFuture<'static, Result<(), Error>>;

/// One-shot asynchronous thunk executed by a worker.
pub type WorkAction = Box<dyn FnOnce() -> WorkFuture + Send>;

/// A named, one-shot unit of work tracked through pending, running and completed.
pub struct WorkItem {
    /// Unique item ID.
    pub id: Uuid,
    /// Task kind (not unique), e.g. `generate`, `review`, `compare`.
    pub name: String,
    /// Current status.
    pub status: WorkStatus,
    /// When a worker claimed the item.
    pub start_time: Option<DateTime<Utc>>,
    /// When the item reached a terminal status.
    pub complete_time: Option<DateTime<Utc>>,
    /// Failure reason, if the item failed.
    pub error: Option<String>,
    action: Option<WorkAction>,
}

impl WorkItem {
    /// Create a pending work item from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: WorkStatus::Pending,
            start_time: None,
            complete_time: None,
            error: None,
            action: Some(Box::new(move || -> WorkFuture { Box::pin(action()) })),
        }
    }

    /// Transition to a new status, stamping the matching timestamp.
    pub fn transition_to(&mut self, status: WorkStatus) -> Result<(), String> {
        if !self.status.can_transition_to(status) {
            return Err(format!(
                "Cannot transition work item {} from {} to {}",
                self.id, self.status, status
            ));
        }

        self.status = status;
        match status {
            WorkStatus::Running => self.start_time = Some(Utc::now()),
            WorkStatus::Completed | WorkStatus::Failed => self.complete_time = Some(Utc::now()),
            WorkStatus::Pending => {}
        }
        Ok(())
    }

    /// Take the action out for execution. Returns `None` once taken.
    pub(crate) fn take_action(&mut self) -> Option<WorkAction> {
        self.action.take()
    }

    /// Serializable view of this item.
    pub fn summary(&self) -> WorkSummary {
        WorkSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status,
            start_time: self.start_time.map(format_time),
            complete_time: self.complete_time.map(format_time),
            error: self.error.clone(),
        }
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("start_time", &self.start_time)
            .field("complete_time", &self.complete_time)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Outcome reported by a worker when it finishes an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Completed,
    Failed(String),
}

impl WorkOutcome {
    /// Terminal status this outcome maps to.
    pub fn status(&self) -> WorkStatus {
        match self {
            Self::Completed => WorkStatus::Completed,
            Self::Failed(_) => WorkStatus::Failed,
        }
    }
}

/// An item handed to a worker by `TaskManager::claim`.
pub struct ClaimedWork {
    pub id: Uuid,
    pub name: String,
    pub worker_id: usize,
    pub(crate) action: Option<WorkAction>,
}

impl ClaimedWork {
    /// Start the action. Yields `None` if the item carried no action.
    pub fn run(self) -> Option<WorkFuture> {
        self.action.map(|action| action())
    }
}

/// Point-in-time summary of a work item, as written to checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub id: Uuid,
    pub name: String,
    pub status: WorkStatus,
    pub start_time: Option<String>,
    pub complete_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}
