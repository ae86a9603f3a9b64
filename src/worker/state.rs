//! Work item status machine.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    /// Waiting in the pending queue.
    Pending,
    /// Claimed by a worker and executing.
    Running,
    /// Action returned successfully.
    Completed,
    /// Action returned an error, panicked or timed out.
    Failed,
}

impl WorkStatus {
    /// Check if this status allows transitioning to another status.
    pub fn can_transition_to(&self, target: WorkStatus) -> bool {
        use WorkStatus::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Completed) | (Running, Failed)
        )
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Phase of a single pool worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    /// Waiting for work.
    Idle,
    /// Executing a claimed item.
    Running,
    /// Observed cancellation and exited.
    Cancelled,
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_valid() {
        assert!(WorkStatus::Pending.can_transition_to(WorkStatus::Running));
        assert!(WorkStatus::Running.can_transition_to(WorkStatus::Completed));
        assert!(WorkStatus::Running.can_transition_to(WorkStatus::Failed));
    }

    #[test]
    fn status_transitions_invalid() {
        assert!(!WorkStatus::Pending.can_transition_to(WorkStatus::Completed));
        assert!(!WorkStatus::Completed.can_transition_to(WorkStatus::Running));
        assert!(!WorkStatus::Failed.can_transition_to(WorkStatus::Completed));
        assert!(!WorkStatus::Completed.can_transition_to(WorkStatus::Failed));
    }

    #[test]
    fn terminal_statuses() {
        assert!(WorkStatus::Completed.is_terminal());
        assert!(WorkStatus::Failed.is_terminal());
        assert!(!WorkStatus::Pending.is_terminal());
        assert!(!WorkStatus::Running.is_terminal());
    }

    #[test]
    fn status_serde_is_snake_case() {
        let json = serde_json::to_string(&WorkStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let parsed: WorkStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, WorkStatus::Failed);
    }

    #[test]
    fn worker_phase_display() {
        assert_eq!(WorkerPhase::Idle.to_string(), "idle");
        assert_eq!(WorkerPhase::Cancelled.to_string(), "cancelled");
    }
}
