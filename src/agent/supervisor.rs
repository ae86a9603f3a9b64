//! Bootstrap supervisor.
//!
//! Loops until enough unlocked hypotheses carry a full review. Each pass:
//! 1. Enqueue a "review" item for every unlocked hypothesis lacking a full
//!    review and not already being reviewed.
//! 2. If the population plus outstanding generation work is below the
//!    target, enqueue one "generate" item.
//! 3. Wait for a work item to finish or the poll interval, whichever is first.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent::capabilities::{Generator, Reviewer};
use crate::config::SchedulerConfig;
use crate::error::{Error, HypothesisError};
use crate::hypothesis::model::Hypothesis;
use crate::hypothesis::state::ResearchState;
use crate::worker::manager::TaskManager;
use crate::worker::task::WorkItem;

pub const GENERATE_TASK: &str = "generate";
pub const REVIEW_TASK: &str = "review";

/// How the bootstrap loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapExit {
    /// The reviewed-count target was reached.
    Completed { reviewed: usize },
    Cancelled,
}

/// What one supervisor pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapStep {
    pub reviewed: usize,
    pub reviews_enqueued: usize,
    pub generation_enqueued: bool,
}

/// Hypothesis IDs with a review item queued or running.
type InFlight = Arc<Mutex<HashSet<String>>>;

pub struct Supervisor {
    state: Arc<ResearchState>,
    manager: Arc<TaskManager>,
    generator: Arc<dyn Generator>,
    reviewer: Arc<dyn Reviewer>,
    min_reviewed: usize,
    poll_interval: Duration,
    in_review: InFlight,
}

impl Supervisor {
    pub fn new(
        state: Arc<ResearchState>,
        manager: Arc<TaskManager>,
        generator: Arc<dyn Generator>,
        reviewer: Arc<dyn Reviewer>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            state,
            manager,
            generator,
            reviewer,
            min_reviewed: config.min_reviewed,
            poll_interval: config.poll_interval,
            in_review: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the bootstrap phase until the review target holds or `cancel` fires.
    pub async fn run_bootstrap(&self, cancel: CancellationToken) -> BootstrapExit {
        info!(
            target_reviewed = self.min_reviewed,
            poll = ?self.poll_interval,
            "Bootstrap started"
        );

        loop {
            if cancel.is_cancelled() {
                info!("Bootstrap cancelled");
                return BootstrapExit::Cancelled;
            }

            let step = self.step().await;
            if step.reviewed >= self.min_reviewed {
                info!(reviewed = step.reviewed, "Bootstrap complete");
                return BootstrapExit::Completed {
                    reviewed: step.reviewed,
                };
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Bootstrap cancelled");
                    return BootstrapExit::Cancelled;
                }
                _ = self.manager.finished() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// One supervisor pass.
    pub async fn step(&self) -> BootstrapStep {
        let survey = self.state.survey().await;
        let mut step = BootstrapStep {
            reviewed: survey.reviewed,
            ..Default::default()
        };
        if survey.reviewed >= self.min_reviewed {
            return step;
        }

        for hypothesis in &survey.awaiting_review {
            if self.enqueue_review(hypothesis).await {
                step.reviews_enqueued += 1;
            }
        }

        // Locked hypotheses are mid-review, so they count toward the target.
        // Queued and running generation counts too, or every pass would add one.
        let population = survey.reviewed + survey.awaiting_review.len() + survey.locked;
        let generating = self.manager.count_outstanding_by_name(GENERATE_TASK).await;
        if population + generating < self.min_reviewed {
            self.enqueue_generate().await;
            step.generation_enqueued = true;
        }

        debug!(
            reviewed = step.reviewed,
            awaiting = survey.awaiting_review.len(),
            locked = survey.locked,
            generating,
            reviews_enqueued = step.reviews_enqueued,
            generation_enqueued = step.generation_enqueued,
            "Bootstrap pass"
        );
        step
    }

    /// Number of hypotheses with a review queued or running.
    pub fn reviews_in_flight(&self) -> usize {
        lock_markers(&self.in_review).len()
    }

    async fn enqueue_review(&self, hypothesis: &Arc<Hypothesis>) -> bool {
        let Some(marker) = ReviewMarker::claim(&self.in_review, hypothesis.id()) else {
            return false;
        };

        let state = Arc::clone(&self.state);
        let reviewer = Arc::clone(&self.reviewer);
        let hypothesis = Arc::clone(hypothesis);

        self.manager
            .enqueue(WorkItem::new(REVIEW_TASK, move || async move {
                let _marker = marker;
                review_hypothesis(&state, &hypothesis, reviewer.as_ref()).await
            }))
            .await;
        true
    }

    async fn enqueue_generate(&self) {
        let state = Arc::clone(&self.state);
        let generator = Arc::clone(&self.generator);

        self.manager
            .enqueue(WorkItem::new(GENERATE_TASK, move || async move {
                let context = state.context_snapshot().await;
                let draft = generator.generate(&context).await?;
                state.add_hypothesis(draft).await;
                Ok(())
            }))
            .await;
    }
}

/// Review one hypothesis under its lock; archive it if the reviewer discards it.
async fn review_hypothesis(
    state: &ResearchState,
    hypothesis: &Hypothesis,
    reviewer: &dyn Reviewer,
) -> Result<(), Error> {
    let discard = {
        let mut guard = hypothesis.acquire().await;
        if guard.is_finalized() {
            return Err(HypothesisError::Finalized {
                id: hypothesis.id().to_string(),
            }
            .into());
        }
        let delta = reviewer.review(&guard).await?;
        let changed = guard.apply_review(&delta);
        debug!(
            hypothesis_id = %hypothesis.id(),
            changed,
            review_version = guard.review_version(),
            "Review applied"
        );
        delta.discard
    };

    if discard {
        info!(hypothesis_id = %hypothesis.id(), "Reviewer discarded hypothesis");
        state.archive(hypothesis.id()).await?;
    }
    Ok(())
}

/// Removes its hypothesis from the in-flight set when dropped, including
/// when the review item fails, panics or is never run.
struct ReviewMarker {
    markers: InFlight,
    id: String,
}

impl ReviewMarker {
    fn claim(markers: &InFlight, id: &str) -> Option<Self> {
        lock_markers(markers).insert(id.to_string()).then(|| Self {
            markers: Arc::clone(markers),
            id: id.to_string(),
        })
    }
}

impl Drop for ReviewMarker {
    fn drop(&mut self) {
        lock_markers(&self.markers).remove(&self.id);
    }
}

fn lock_markers(markers: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    markers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
