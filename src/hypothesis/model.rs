//! Hypothesis and review records.
//!
//! Each [`Hypothesis`] owns an exclusive lock over its mutable record. The
//! lock itself is never handed out: callers go through
//! [`Hypothesis::try_acquire`] or [`Hypothesis::acquire`] and mutate via the
//! returned [`HypothesisGuard`], which bumps the version counters.

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// Starting Elo rating for new hypotheses.
pub const DEFAULT_RATING: f64 = 1200.0;

/// A literature reference attached to a hypothesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub name: String,
    /// Literature review notes for this article.
    pub review: String,
    pub link: String,
}

/// Review stages performed on a hypothesis. Empty means "not yet performed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub summary: String,
    /// Quick pass without literature search; decides whether to discard.
    pub initial: String,
    /// Full review with literature grounding.
    pub full: String,
    /// Assumptions decomposed and verified one by one.
    pub deep_verify: String,
    /// Whether existing observations are explained by the hypothesis.
    pub observation: String,
    /// Step-through simulation of the mechanism or experiment.
    pub simulation: String,
}

impl Review {
    pub fn has_full_review(&self) -> bool {
        !self.full.trim().is_empty()
    }

    /// Apply the stages present in `delta`. Returns true if anything changed.
    fn apply(&mut self, delta: &ReviewDelta) -> bool {
        let mut changed = false;
        let stages = [
            (&mut self.summary, &delta.summary),
            (&mut self.initial, &delta.initial),
            (&mut self.full, &delta.full),
            (&mut self.deep_verify, &delta.deep_verify),
            (&mut self.observation, &delta.observation),
            (&mut self.simulation, &delta.simulation),
        ];
        for (field, update) in stages {
            if let Some(text) = update
                && *field != *text
            {
                field.clone_from(text);
                changed = true;
            }
        }
        changed
    }
}

/// Output of the review capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDelta {
    pub summary: Option<String>,
    pub initial: Option<String>,
    pub full: Option<String>,
    pub deep_verify: Option<String>,
    pub observation: Option<String>,
    pub simulation: Option<String>,
    /// The reviewer judged the hypothesis not worth pursuing.
    #[serde(default)]
    pub discard: bool,
}

impl ReviewDelta {
    /// Delta carrying only a full review.
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            full: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Output of the generation capability, before an ID is assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisDraft {
    pub content: String,
    pub selected_articles: Vec<Article>,
}

impl HypothesisDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            selected_articles: Vec::new(),
        }
    }
}

/// Mutable fields of a hypothesis, guarded by its lock.
#[derive(Debug, Clone, Serialize)]
pub struct HypothesisRecord {
    rating: f64,
    content: String,
    review: Review,
    selected_articles: Vec<Article>,
    debate_logs: Vec<String>,
    finalized_content: Option<String>,
    hypothesis_version: u64,
    review_version: u64,
}

impl HypothesisRecord {
    fn from_draft(draft: HypothesisDraft) -> Self {
        Self {
            rating: DEFAULT_RATING,
            content: draft.content,
            review: Review::default(),
            selected_articles: draft.selected_articles,
            debate_logs: Vec::new(),
            finalized_content: None,
            hypothesis_version: 0,
            review_version: 0,
        }
    }

    pub fn rating(&self) -> f64 {
        self.rating
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn review(&self) -> &Review {
        &self.review
    }

    pub fn selected_articles(&self) -> &[Article] {
        &self.selected_articles
    }

    pub fn debate_logs(&self) -> &[String] {
        &self.debate_logs
    }

    pub fn finalized_content(&self) -> Option<&str> {
        self.finalized_content.as_deref()
    }

    /// Finalized hypotheses are archived and take no further work.
    pub fn is_finalized(&self) -> bool {
        self.finalized_content
            .as_deref()
            .is_some_and(|c| !c.is_empty())
    }

    pub fn hypothesis_version(&self) -> u64 {
        self.hypothesis_version
    }

    pub fn review_version(&self) -> u64 {
        self.review_version
    }

    /// `hypothesis_version + review_version`, the freshness signal for ranking.
    pub fn combined_version(&self) -> u64 {
        self.hypothesis_version + self.review_version
    }
}

/// Read-only copy of a hypothesis taken while its lock was held.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisView {
    pub id: String,
    pub rating: f64,
    pub content: String,
    pub hypothesis_version: u64,
    pub review_version: u64,
    pub has_full_review: bool,
    pub finalized: bool,
}

impl HypothesisView {
    pub fn combined_version(&self) -> u64 {
        self.hypothesis_version + self.review_version
    }
}

/// A versioned, individually lockable candidate.
#[derive(Debug)]
pub struct Hypothesis {
    id: String,
    record: Mutex<HypothesisRecord>,
}

impl Hypothesis {
    pub(crate) fn new(id: impl Into<String>, draft: HypothesisDraft) -> Self {
        Self {
            id: id.into(),
            record: Mutex::new(HypothesisRecord::from_draft(draft)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True while some task holds this hypothesis for mutation.
    ///
    /// Probes with a non-blocking acquire, so a concurrent probe can briefly
    /// observe the other as a holder. Callers treat that as "skip this pass".
    pub fn is_locked(&self) -> bool {
        self.record.try_lock().is_err()
    }

    /// Acquire without waiting; `None` if the hypothesis is busy.
    pub fn try_acquire(&self) -> Option<HypothesisGuard<'_>> {
        self.record.try_lock().ok().map(|record| HypothesisGuard {
            id: &self.id,
            record,
        })
    }

    /// Wait for exclusive access.
    pub async fn acquire(&self) -> HypothesisGuard<'_> {
        HypothesisGuard {
            id: &self.id,
            record: self.record.lock().await,
        }
    }
}

/// Exclusive access to one hypothesis. Released on drop.
pub struct HypothesisGuard<'a> {
    id: &'a str,
    record: MutexGuard<'a, HypothesisRecord>,
}

impl HypothesisGuard<'_> {
    pub fn id(&self) -> &str {
        self.id
    }

    /// Replace the content, bumping `hypothesis_version`.
    pub fn revise(&mut self, draft: HypothesisDraft) {
        self.record.content = draft.content;
        self.record.selected_articles = draft.selected_articles;
        self.record.hypothesis_version += 1;
    }

    /// Merge a review, bumping `review_version` if any stage changed.
    /// Returns whether the review changed.
    pub fn apply_review(&mut self, delta: &ReviewDelta) -> bool {
        let changed = self.record.review.apply(delta);
        if changed {
            self.record.review_version += 1;
        }
        changed
    }

    pub fn set_rating(&mut self, rating: f64) {
        self.record.rating = rating;
    }

    pub fn push_debate_log(&mut self, entry: impl Into<String>) {
        self.record.debate_logs.push(entry.into());
    }

    /// Store the post-debate final form. The caller archives the hypothesis.
    pub fn finalize(&mut self, content: impl Into<String>) {
        self.record.finalized_content = Some(content.into());
    }

    pub fn view(&self) -> HypothesisView {
        HypothesisView {
            id: self.id.to_string(),
            rating: self.record.rating,
            content: self.record.content.clone(),
            hypothesis_version: self.record.hypothesis_version,
            review_version: self.record.review_version,
            has_full_review: self.record.review.has_full_review(),
            finalized: self.record.is_finalized(),
        }
    }
}

impl Deref for HypothesisGuard<'_> {
    type Target = HypothesisRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hypothesis() -> Hypothesis {
        Hypothesis::new("hyp-1", HypothesisDraft::new("KIRA6 inhibits IRE1a in AML"))
    }

    #[test]
    fn new_hypothesis_defaults() {
        let h = hypothesis();
        let guard = h.try_acquire().unwrap();
        assert_eq!(guard.rating(), DEFAULT_RATING);
        assert_eq!(guard.combined_version(), 0);
        assert!(!guard.review().has_full_review());
        assert!(!guard.is_finalized());
    }

    #[test]
    fn guard_marks_hypothesis_locked() {
        let h = hypothesis();
        assert!(!h.is_locked());
        let guard = h.try_acquire().unwrap();
        assert!(h.is_locked());
        assert!(h.try_acquire().is_none());
        drop(guard);
        assert!(!h.is_locked());
    }

    #[test]
    fn revise_bumps_hypothesis_version() {
        let h = hypothesis();
        let mut guard = h.try_acquire().unwrap();
        guard.revise(HypothesisDraft::new("refined"));
        assert_eq!(guard.content(), "refined");
        assert_eq!(guard.hypothesis_version(), 1);
        assert_eq!(guard.review_version(), 0);
    }

    #[test]
    fn review_bumps_only_on_change() {
        let h = hypothesis();
        let mut guard = h.try_acquire().unwrap();
        assert!(guard.apply_review(&ReviewDelta::full("plausible")));
        assert_eq!(guard.review_version(), 1);
        assert!(guard.review().has_full_review());

        assert!(!guard.apply_review(&ReviewDelta::full("plausible")));
        assert_eq!(guard.review_version(), 1);

        assert!(!guard.apply_review(&ReviewDelta::default()));
        assert_eq!(guard.review_version(), 1);
    }

    #[test]
    fn whitespace_full_review_does_not_count() {
        let review = Review {
            full: "   ".into(),
            ..Default::default()
        };
        assert!(!review.has_full_review());
    }

    #[test]
    fn finalize_requires_non_empty_content() {
        let h = hypothesis();
        let mut guard = h.try_acquire().unwrap();
        guard.finalize("");
        assert!(!guard.is_finalized());
        guard.finalize("final proposal");
        assert!(guard.is_finalized());
        assert_eq!(guard.finalized_content(), Some("final proposal"));
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let h = std::sync::Arc::new(hypothesis());
        let guard = h.try_acquire().unwrap();

        let waiter = {
            let h = std::sync::Arc::clone(&h);
            tokio::spawn(async move { h.acquire().await.id().to_string() })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), "hyp-1");
    }
}
