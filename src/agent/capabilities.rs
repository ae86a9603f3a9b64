//! External capabilities consumed by the scheduler.
//!
//! Generation, review and comparison are opaque async operations. The
//! scheduler only guarantees the locking contract around each call:
//! review runs with the hypothesis lock held, comparison with both held.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;
use crate::hypothesis::model::{HypothesisDraft, HypothesisGuard, ReviewDelta};
use crate::hypothesis::state::ResearchContext;

// ── Capability traits ───────────────────────────────────────────────

/// Produces new hypotheses from the research context.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &ResearchContext) -> Result<HypothesisDraft, CapabilityError>;
}

/// Reviews one hypothesis. Called only while its lock is held.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, hypothesis: &HypothesisGuard<'_>) -> Result<ReviewDelta, CapabilityError>;
}

/// Debates two hypotheses and names a winner. Called only while both
/// locks are held.
#[async_trait]
pub trait Comparator: Send + Sync {
    async fn compare(
        &self,
        a: &HypothesisGuard<'_>,
        b: &HypothesisGuard<'_>,
    ) -> Result<MatchOutcome, CapabilityError>;
}

// ── Comparison outcome ──────────────────────────────────────────────

/// Which side of a comparison won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    First,
    Second,
}

/// Result of one comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub winner: Winner,
    /// Debate transcript, appended to both participants' logs.
    #[serde(default)]
    pub debate_log: String,
}

impl MatchOutcome {
    pub fn new(winner: Winner, debate_log: impl Into<String>) -> Self {
        Self {
            winner,
            debate_log: debate_log.into(),
        }
    }
}

// ── Built-in stand-ins ──────────────────────────────────────────────

/// Deterministic capabilities for local runs without a model backend.
///
/// Generation numbers its drafts, review writes a fixed full review, and
/// comparison prefers the higher-rated side (first on ties).
#[derive(Debug, Default)]
pub struct EchoCapabilities;

#[async_trait]
impl Generator for EchoCapabilities {
    async fn generate(&self, context: &ResearchContext) -> Result<HypothesisDraft, CapabilityError> {
        Ok(HypothesisDraft::new(format!(
            "Candidate #{} for: {}",
            context.hypotheses.len() + 1,
            context.goal
        )))
    }
}

#[async_trait]
impl Reviewer for EchoCapabilities {
    async fn review(&self, hypothesis: &HypothesisGuard<'_>) -> Result<ReviewDelta, CapabilityError> {
        Ok(ReviewDelta {
            initial: Some(format!("{} passes the initial screen", hypothesis.id())),
            full: Some(format!("Full review of: {}", hypothesis.content())),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Comparator for EchoCapabilities {
    async fn compare(
        &self,
        a: &HypothesisGuard<'_>,
        b: &HypothesisGuard<'_>,
    ) -> Result<MatchOutcome, CapabilityError> {
        let winner = if b.rating() > a.rating() {
            Winner::Second
        } else {
            Winner::First
        };
        Ok(MatchOutcome::new(
            winner,
            format!("{} vs {}: decided on rating", a.id(), b.id()),
        ))
    }
}
