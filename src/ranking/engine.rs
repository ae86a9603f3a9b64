//! Ranking engine: selects comparison pairs and schedules them as work.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::agent::capabilities::Comparator;
use crate::config::RankingConfig;
use crate::hypothesis::model::HypothesisView;
use crate::hypothesis::state::ResearchState;
use crate::ranking::selection::{self, Proximity, RandomProximity, RankingPair};
use crate::ranking::tournament;
use crate::worker::manager::TaskManager;
use crate::worker::task::WorkItem;

/// Work item name used for scheduled comparisons.
pub const COMPARE_TASK: &str = "compare";

const DEFAULT_ELO_K: f64 = 32.0;

pub struct RankingEngine {
    state: Arc<ResearchState>,
    config: RankingConfig,
    proximity: Arc<dyn Proximity>,
    k_factor: f64,
}

impl RankingEngine {
    pub fn new(state: Arc<ResearchState>, config: RankingConfig) -> Self {
        Self {
            state,
            config,
            proximity: Arc::new(RandomProximity),
            k_factor: DEFAULT_ELO_K,
        }
    }

    /// Replace the placeholder proximity score.
    pub fn with_proximity(mut self, proximity: Arc<dyn Proximity>) -> Self {
        self.proximity = proximity;
        self
    }

    pub fn with_k_factor(mut self, k_factor: f64) -> Self {
        self.k_factor = k_factor;
        self
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    pub fn compute_priority(&self, view: &HypothesisView) -> f64 {
        selection::priority(view, self.config.steep_multiplier)
    }

    /// Propose up to `n` disjoint pairs of unlocked hypotheses that have not
    /// been compared at their current versions. `None` if no valid pair exists.
    pub async fn select_next_ranking_pairs(&self, n: usize) -> Option<Vec<RankingPair>> {
        let config = RankingConfig {
            pairs: n,
            ..self.config.clone()
        };
        let proximity = Arc::clone(&self.proximity);

        let pairs = self
            .state
            .with_candidates(|candidates, history| {
                let mut rng = rand::thread_rng();
                selection::select_pairs(&candidates, history, &config, proximity.as_ref(), &mut rng)
            })
            .await;

        if pairs.is_empty() {
            debug!("No valid ranking pair this pass");
            None
        } else {
            Some(pairs)
        }
    }

    /// Same as [`select_next_ranking_pairs`](Self::select_next_ranking_pairs)
    /// with a caller-supplied RNG.
    pub async fn select_pairs_with<R: Rng + Send>(&self, n: usize, rng: &mut R) -> Vec<RankingPair> {
        let config = RankingConfig {
            pairs: n,
            ..self.config.clone()
        };
        let proximity = Arc::clone(&self.proximity);
        self.state
            .with_candidates(|candidates, history| {
                selection::select_pairs(&candidates, history, &config, proximity.as_ref(), rng)
            })
            .await
    }

    /// Select one round of pairs and enqueue a "compare" item for each.
    /// Returns how many items were enqueued.
    pub async fn enqueue_round(&self, manager: &TaskManager, comparator: Arc<dyn Comparator>) -> usize {
        let Some(pairs) = self.select_next_ranking_pairs(self.config.pairs).await else {
            return 0;
        };

        let count = pairs.len();
        for pair in pairs {
            let state = Arc::clone(&self.state);
            let comparator = Arc::clone(&comparator);
            let k_factor = self.k_factor;
            let first = pair.first.hypothesis;
            let second = pair.second.hypothesis;

            manager
                .enqueue(WorkItem::new(COMPARE_TASK, move || async move {
                    tournament::run_match(&state, &first, &second, comparator.as_ref(), k_factor)
                        .await
                        .map(|_| ())
                }))
                .await;
        }

        info!(pairs = count, "Ranking round scheduled");
        count
    }
}
