//! Error types for the co-scientist scheduler.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Hypothesis error: {0}")]
    Hypothesis(#[from] HypothesisError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while executing a work item.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {name} failed: {reason}")]
    ActionFailed { name: String, reason: String },

    #[error("Task {name} timed out after {timeout:?}")]
    TimedOut { name: String, timeout: Duration },

    #[error("Task {name} panicked: {reason}")]
    Panicked { name: String, reason: String },
}

/// Checkpoint persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by the external generation, review and comparison capabilities.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Review of {id} failed: {reason}")]
    Review { id: String, reason: String },

    #[error("Comparison of {a} vs {b} failed: {reason}")]
    Comparison { a: String, b: String, reason: String },
}

/// Hypothesis lookup and lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum HypothesisError {
    #[error("Hypothesis {id} not found")]
    NotFound { id: String },

    #[error("Hypothesis {id} is finalized")]
    Finalized { id: String },
}

/// Result type alias for the scheduler.
pub type Result<T> = std::result::Result<T, Error>;
