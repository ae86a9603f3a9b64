//! Pair selection for tournament comparisons.
//!
//! Pure functions over a candidate snapshot and the match history. No
//! locking or I/O happens here, so the RNG can be seeded in tests.
//!
//! Selection rules:
//! 1. Score every candidate: `rating + combined_version * steep_multiplier`.
//! 2. Weighted-sample up to `first_candidates` distinct first picks; the
//!    rest form a fallback pool sorted by descending score.
//! 3. For each first pick, weighted-sample a partner from the unpaired
//!    candidates it has not yet met at their current combined versions,
//!    weight `priority + proximity`.
//! 4. Record each accepted pair immediately.
//! 5. Walk the fallback pool the same way until enough pairs are found.
//!
//! A candidate with no eligible partner at its turn never gains one later,
//! so one pass over all candidates finds a pair whenever any exists.
//!
//! Pairs never share a member, so every accepted pair can be locked and
//! compared concurrently with the others.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::debug;

use crate::config::RankingConfig;
use crate::hypothesis::model::HypothesisView;
use crate::hypothesis::state::{Candidate, MatchHistory};

/// Affinity between two hypotheses, added to the partner's priority.
pub trait Proximity: Send + Sync {
    fn score(&self, a: &HypothesisView, b: &HypothesisView) -> f64;
}

impl<F> Proximity for F
where
    F: Fn(&HypothesisView, &HypothesisView) -> f64 + Send + Sync,
{
    fn score(&self, a: &HypothesisView, b: &HypothesisView) -> f64 {
        self(a, b)
    }
}

/// Placeholder proximity: uniform noise in `[0, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomProximity;

impl Proximity for RandomProximity {
    fn score(&self, _a: &HypothesisView, _b: &HypothesisView) -> f64 {
        rand::random::<f64>()
    }
}

/// Two disjoint candidates chosen for comparison.
#[derive(Debug, Clone)]
pub struct RankingPair {
    pub first: Candidate,
    pub second: Candidate,
}

impl RankingPair {
    pub fn ids(&self) -> (&str, &str) {
        (&self.first.view.id, &self.second.view.id)
    }

    /// True if `id` is either member.
    pub fn contains(&self, id: &str) -> bool {
        self.first.view.id == id || self.second.view.id == id
    }
}

/// Priority score biasing selection toward freshly changed hypotheses.
pub fn priority(view: &HypothesisView, steep_multiplier: f64) -> f64 {
    view.rating + view.combined_version() as f64 * steep_multiplier
}

/// Select up to `config.pairs` disjoint, not-yet-compared pairs, recording
/// each accepted pair in `history`.
pub fn select_pairs<R: Rng + ?Sized>(
    candidates: &[Candidate],
    history: &mut MatchHistory,
    config: &RankingConfig,
    proximity: &dyn Proximity,
    rng: &mut R,
) -> Vec<RankingPair> {
    if config.pairs == 0 || candidates.len() < 2 {
        return Vec::new();
    }

    let scores: Vec<f64> = candidates
        .iter()
        .map(|c| priority(&c.view, config.steep_multiplier))
        .collect();

    let (firsts, fallback) = pick_first_candidates(&scores, config.first_candidates, rng);

    let mut paired = vec![false; candidates.len()];
    let mut pairs = Vec::new();

    for a in firsts.into_iter().chain(fallback) {
        if pairs.len() >= config.pairs {
            break;
        }
        if paired[a] {
            continue;
        }

        let va = &candidates[a].view;
        let side_a = (va.id.as_str(), va.combined_version());
        let options: Vec<(usize, f64)> = (0..candidates.len())
            .filter(|&b| b != a && !paired[b])
            .filter(|&b| {
                let vb = &candidates[b].view;
                !history.is_already_compared(side_a, (vb.id.as_str(), vb.combined_version()))
            })
            .map(|b| {
                let affinity = proximity.score(va, &candidates[b].view);
                (b, scores[b] + affinity)
            })
            .collect();
        if options.is_empty() {
            debug!(id = %va.id, "No eligible partner at current versions");
            continue;
        }

        let weights: Vec<f64> = options.iter().map(|(_, w)| *w).collect();
        let b = options[weighted_pick(&weights, rng)].0;

        let vb = &candidates[b].view;
        history.record(side_a, (vb.id.as_str(), vb.combined_version()));
        paired[a] = true;
        paired[b] = true;
        pairs.push(RankingPair {
            first: candidates[a].clone(),
            second: candidates[b].clone(),
        });
    }

    pairs
}

/// Weighted sampling without replacement of up to `count` indices. Returns
/// the picks in draw order and the remaining indices by descending score.
fn pick_first_candidates<R: Rng + ?Sized>(
    scores: &[f64],
    count: usize,
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let mut pool: Vec<usize> = (0..scores.len()).collect();
    let mut picks = Vec::with_capacity(count.min(pool.len()));

    while picks.len() < count && !pool.is_empty() {
        let weights: Vec<f64> = pool.iter().map(|&i| scores[i]).collect();
        let slot = weighted_pick(&weights, rng);
        picks.push(pool.remove(slot));
    }

    pool.sort_by(|&x, &y| scores[y].total_cmp(&scores[x]));
    (picks, pool)
}

/// Index drawn with probability proportional to weight. Negative or
/// non-finite weights count as zero; if nothing is left, draw uniformly.
fn weighted_pick<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    let clean = weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 });
    match WeightedIndex::new(clean) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..weights.len()),
    }
}
