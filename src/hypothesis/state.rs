//! Shared scheduling state: ID counter, active and archived hypotheses,
//! and the match history table.
//!
//! One state lock guards membership and the history. It is only held for
//! short, non-blocking work; per-hypothesis locks are probed with
//! `try_acquire` while it is held, never awaited.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::HypothesisError;
use crate::hypothesis::model::{Hypothesis, HypothesisDraft, HypothesisGuard, HypothesisView};

/// Unordered hypothesis pair, stored as `(min_id, max_id)`.
pub type PairKey = (String, String);

/// Last compared combined versions per unordered pair.
///
/// Versions are stored in key order: the first element belongs to the
/// lexicographically smaller ID.
#[derive(Debug, Clone, Default)]
pub struct MatchHistory {
    entries: HashMap<PairKey, (u64, u64)>,
}

impl MatchHistory {
    pub fn key(a: &str, b: &str) -> PairKey {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    fn ordered(a: (&str, u64), b: (&str, u64)) -> (PairKey, (u64, u64)) {
        if a.0 <= b.0 {
            ((a.0.to_string(), b.0.to_string()), (a.1, b.1))
        } else {
            ((b.0.to_string(), a.0.to_string()), (b.1, a.1))
        }
    }

    /// True if the pair was compared at exactly these combined versions.
    pub fn is_already_compared(&self, a: (&str, u64), b: (&str, u64)) -> bool {
        let (key, versions) = Self::ordered(a, b);
        self.entries.get(&key) == Some(&versions)
    }

    /// Record a comparison at the given combined versions.
    pub fn record(&mut self, a: (&str, u64), b: (&str, u64)) {
        let (key, versions) = Self::ordered(a, b);
        self.entries.insert(key, versions);
    }

    /// Recorded versions for a pair, in key order.
    pub fn get(&self, a: &str, b: &str) -> Option<(u64, u64)> {
        self.entries.get(&Self::key(a, b)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only research context handed to the generation capability.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchContext {
    pub goal: String,
    /// Unlocked, active hypotheses at snapshot time.
    pub hypotheses: Vec<HypothesisView>,
}

/// Population counts used by the bootstrap supervisor.
#[derive(Debug, Default)]
pub struct PopulationSurvey {
    /// Unlocked hypotheses with a completed full review.
    pub reviewed: usize,
    /// Unlocked hypotheses still lacking a full review.
    pub awaiting_review: Vec<Arc<Hypothesis>>,
    /// Hypotheses currently held by some task.
    pub locked: usize,
}

/// An unlocked hypothesis plus the view read while probing it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub hypothesis: Arc<Hypothesis>,
    pub view: HypothesisView,
}

struct StateInner {
    goal: String,
    next_id: u64,
    hypotheses: Vec<Arc<Hypothesis>>,
    archive: Vec<Arc<Hypothesis>>,
    match_history: MatchHistory,
}

/// Process-wide research state shared by the supervisor, workers and ranking.
pub struct ResearchState {
    inner: Mutex<StateInner>,
}

impl ResearchState {
    pub fn new(goal: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(StateInner {
                goal: goal.into(),
                next_id: 1,
                hypotheses: Vec::new(),
                archive: Vec::new(),
                match_history: MatchHistory::default(),
            }),
        })
    }

    pub async fn goal(&self) -> String {
        self.inner.lock().await.goal.clone()
    }

    /// Register a generated hypothesis under the next ID.
    pub async fn add_hypothesis(&self, draft: HypothesisDraft) -> Arc<Hypothesis> {
        let mut inner = self.inner.lock().await;
        let id = format!("hyp-{}", inner.next_id);
        inner.next_id += 1;

        let hypothesis = Arc::new(Hypothesis::new(id, draft));
        inner.hypotheses.push(Arc::clone(&hypothesis));
        info!(hypothesis_id = %hypothesis.id(), active = inner.hypotheses.len(), "Hypothesis added");
        hypothesis
    }

    /// Active hypotheses, in insertion order.
    pub async fn hypotheses(&self) -> Vec<Arc<Hypothesis>> {
        self.inner.lock().await.hypotheses.clone()
    }

    /// Archived hypotheses, in archive order.
    pub async fn archived(&self) -> Vec<Arc<Hypothesis>> {
        self.inner.lock().await.archive.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Hypothesis>> {
        let inner = self.inner.lock().await;
        inner
            .hypotheses
            .iter()
            .chain(inner.archive.iter())
            .find(|h| h.id() == id)
            .cloned()
    }

    /// Move an active hypothesis to the archive. Archived hypotheses are
    /// kept, never deleted, and are excluded from further scheduling.
    pub async fn archive(&self, id: &str) -> Result<Arc<Hypothesis>, HypothesisError> {
        let mut inner = self.inner.lock().await;
        let pos = inner
            .hypotheses
            .iter()
            .position(|h| h.id() == id)
            .ok_or_else(|| HypothesisError::NotFound { id: id.to_string() })?;
        let hypothesis = inner.hypotheses.remove(pos);
        inner.archive.push(Arc::clone(&hypothesis));
        info!(hypothesis_id = %id, "Hypothesis archived");
        Ok(hypothesis)
    }

    /// Store the final form of an active hypothesis and archive it.
    ///
    /// Waits for the hypothesis lock with the state lock released.
    pub async fn finalize(
        &self,
        id: &str,
        content: impl Into<String>,
    ) -> Result<Arc<Hypothesis>, HypothesisError> {
        let hypothesis = {
            let inner = self.inner.lock().await;
            inner
                .hypotheses
                .iter()
                .find(|h| h.id() == id)
                .cloned()
                .ok_or_else(|| HypothesisError::NotFound { id: id.to_string() })?
        };

        {
            let mut guard = hypothesis.acquire().await;
            if guard.is_finalized() {
                return Err(HypothesisError::Finalized { id: id.to_string() });
            }
            guard.finalize(content);
        }

        self.archive(id).await
    }

    /// Unlocked, unfinalized active hypotheses with a view of each.
    pub async fn unlocked_candidates(&self) -> Vec<Candidate> {
        let inner = self.inner.lock().await;
        collect_candidates(&inner.hypotheses)
    }

    /// Goal plus views of all unlocked active hypotheses.
    pub async fn context_snapshot(&self) -> ResearchContext {
        let inner = self.inner.lock().await;
        ResearchContext {
            goal: inner.goal.clone(),
            hypotheses: collect_candidates(&inner.hypotheses)
                .into_iter()
                .map(|c| c.view)
                .collect(),
        }
    }

    /// Classify the active population for the bootstrap loop.
    pub async fn survey(&self) -> PopulationSurvey {
        let inner = self.inner.lock().await;
        let mut survey = PopulationSurvey::default();
        for hypothesis in &inner.hypotheses {
            let Some(guard) = hypothesis.try_acquire() else {
                survey.locked += 1;
                continue;
            };
            if guard.is_finalized() {
                continue;
            }
            if guard.review().has_full_review() {
                survey.reviewed += 1;
            } else {
                drop(guard);
                survey.awaiting_review.push(Arc::clone(hypothesis));
            }
        }
        survey
    }

    /// Snapshot unlocked candidates and run `f` against them together with
    /// the match history, all under one hold of the state lock. `f` must not
    /// block.
    pub async fn with_candidates<R>(
        &self,
        f: impl FnOnce(Vec<Candidate>, &mut MatchHistory) -> R,
    ) -> R {
        let mut inner = self.inner.lock().await;
        let candidates = collect_candidates(&inner.hypotheses);
        f(candidates, &mut inner.match_history)
    }

    /// Run `f` against the match history under the state lock.
    pub async fn with_match_history<R>(&self, f: impl FnOnce(&mut MatchHistory) -> R) -> R {
        let mut inner = self.inner.lock().await;
        f(&mut inner.match_history)
    }

    /// Acquire both hypotheses without waiting, checked under the state
    /// lock. Returns `None`, holding neither, if either is busy.
    pub async fn try_acquire_pair<'h>(
        &self,
        a: &'h Hypothesis,
        b: &'h Hypothesis,
    ) -> Option<(HypothesisGuard<'h>, HypothesisGuard<'h>)> {
        let _state = self.inner.lock().await;
        let guard_a = a.try_acquire()?;
        let Some(guard_b) = b.try_acquire() else {
            debug!(a = %a.id(), b = %b.id(), "Second hypothesis busy, releasing first");
            return None;
        };
        Some((guard_a, guard_b))
    }
}

fn collect_candidates(hypotheses: &[Arc<Hypothesis>]) -> Vec<Candidate> {
    hypotheses
        .iter()
        .filter_map(|h| {
            let view = h.try_acquire()?.view();
            (!view.finalized).then(|| Candidate {
                hypothesis: Arc::clone(h),
                view,
            })
        })
        .collect()
}
