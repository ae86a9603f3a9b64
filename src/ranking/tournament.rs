//! Executing one comparison between two hypotheses.

use serde::Serialize;
use tracing::{debug, info};

use crate::agent::capabilities::{Comparator, Winner};
use crate::error::Error;
use crate::hypothesis::model::Hypothesis;
use crate::hypothesis::state::ResearchState;

/// Elo scale: a 400 point gap means 10:1 expected odds.
const ELO_SCALE: f64 = 400.0;

/// What happened when a pair was submitted for comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    Played {
        winner: String,
        loser: String,
        winner_rating: f64,
        loser_rating: f64,
    },
    /// One side was busy or finalized; nothing changed.
    Skipped,
}

/// New `(winner, loser)` ratings after one decisive game.
pub fn elo_update(winner: f64, loser: f64, k_factor: f64) -> (f64, f64) {
    let expected_win = 1.0 / (1.0 + 10f64.powf((loser - winner) / ELO_SCALE));
    let delta = k_factor * (1.0 - expected_win);
    (winner + delta, loser - delta)
}

/// Compare `a` and `b` with both locks held.
///
/// The pair is acquired all-or-nothing; if either side is busy the match is
/// skipped rather than waited for. After the comparison the ratings and
/// debate logs are updated and the pair is recorded at its current versions.
pub async fn run_match(
    state: &ResearchState,
    a: &Hypothesis,
    b: &Hypothesis,
    comparator: &dyn Comparator,
    k_factor: f64,
) -> Result<MatchResult, Error> {
    let Some((mut ga, mut gb)) = state.try_acquire_pair(a, b).await else {
        debug!(a = %a.id(), b = %b.id(), "Pair busy, skipping comparison");
        return Ok(MatchResult::Skipped);
    };
    if ga.is_finalized() || gb.is_finalized() {
        debug!(a = %a.id(), b = %b.id(), "Finalized participant, skipping comparison");
        return Ok(MatchResult::Skipped);
    }

    let outcome = comparator.compare(&ga, &gb).await?;

    let (winner, loser) = match outcome.winner {
        Winner::First => (&mut ga, &mut gb),
        Winner::Second => (&mut gb, &mut ga),
    };
    let (winner_rating, loser_rating) = elo_update(winner.rating(), loser.rating(), k_factor);
    winner.set_rating(winner_rating);
    loser.set_rating(loser_rating);

    let winner_id = winner.id().to_string();
    let loser_id = loser.id().to_string();
    if !outcome.debate_log.is_empty() {
        ga.push_debate_log(outcome.debate_log.clone());
        gb.push_debate_log(outcome.debate_log);
    }

    let side_a = (a.id().to_string(), ga.combined_version());
    let side_b = (b.id().to_string(), gb.combined_version());
    drop((ga, gb));

    state
        .with_match_history(|history| {
            history.record((&side_a.0, side_a.1), (&side_b.0, side_b.1));
        })
        .await;

    info!(
        winner = %winner_id,
        loser = %loser_id,
        winner_rating,
        loser_rating,
        "Comparison finished"
    );

    Ok(MatchResult::Played {
        winner: winner_id,
        loser: loser_id,
        winner_rating,
        loser_rating,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::agent::capabilities::MatchOutcome;
    use crate::error::CapabilityError;
    use crate::hypothesis::model::{DEFAULT_RATING, HypothesisDraft, HypothesisGuard};

    struct FirstWins {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Comparator for FirstWins {
        async fn compare(
            &self,
            a: &HypothesisGuard<'_>,
            b: &HypothesisGuard<'_>,
        ) -> Result<MatchOutcome, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MatchOutcome::new(Winner::First, format!("{} beat {}", a.id(), b.id())))
        }
    }

    struct Broken;

    #[async_trait]
    impl Comparator for Broken {
        async fn compare(
            &self,
            a: &HypothesisGuard<'_>,
            b: &HypothesisGuard<'_>,
        ) -> Result<MatchOutcome, CapabilityError> {
            Err(CapabilityError::Comparison {
                a: a.id().to_string(),
                b: b.id().to_string(),
                reason: "judge unavailable".into(),
            })
        }
    }

    fn first_wins() -> FirstWins {
        FirstWins {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn elo_update_is_zero_sum() {
        let (w, l) = elo_update(1200.0, 1200.0, 32.0);
        assert_eq!(w, 1216.0);
        assert_eq!(l, 1184.0);

        let (w, l) = elo_update(1000.0, 1400.0, 32.0);
        assert!((w + l - 2400.0).abs() < 1e-9);
        // Upset gains more than an expected win.
        assert!(w - 1000.0 > 16.0);
    }

    #[tokio::test]
    async fn played_match_updates_ratings_and_history() {
        let state = ResearchState::new("goal");
        let a = state.add_hypothesis(HypothesisDraft::new("a")).await;
        let b = state.add_hypothesis(HypothesisDraft::new("b")).await;
        let judge = first_wins();

        let result = run_match(&state, &a, &b, &judge, 32.0).await.unwrap();
        assert!(matches!(result, MatchResult::Played { ref winner, .. } if winner == "hyp-1"));

        let ga = a.try_acquire().unwrap();
        let gb = b.try_acquire().unwrap();
        assert!(ga.rating() > DEFAULT_RATING);
        assert!(gb.rating() < DEFAULT_RATING);
        assert_eq!(ga.debate_logs(), ["hyp-1 beat hyp-2"]);
        assert_eq!(gb.debate_logs().len(), 1);
        drop((ga, gb));

        let recorded = state.with_match_history(|h| h.get("hyp-1", "hyp-2")).await;
        assert_eq!(recorded, Some((0, 0)));
    }

    #[tokio::test]
    async fn busy_participant_skips_without_calling_judge() {
        let state = ResearchState::new("goal");
        let a = state.add_hypothesis(HypothesisDraft::new("a")).await;
        let b = state.add_hypothesis(HypothesisDraft::new("b")).await;
        let judge = first_wins();

        let held = b.try_acquire().unwrap();
        let result = run_match(&state, &a, &b, &judge, 32.0).await.unwrap();
        assert_eq!(result, MatchResult::Skipped);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
        assert!(!a.is_locked());
        drop(held);
    }

    #[tokio::test]
    async fn finalized_participant_is_skipped() {
        let state = ResearchState::new("goal");
        let a = state.add_hypothesis(HypothesisDraft::new("a")).await;
        let b = state.add_hypothesis(HypothesisDraft::new("b")).await;
        a.try_acquire().unwrap().finalize("final");

        let judge = first_wins();
        let result = run_match(&state, &a, &b, &judge, 32.0).await.unwrap();
        assert_eq!(result, MatchResult::Skipped);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn comparator_error_releases_both_locks() {
        let state = ResearchState::new("goal");
        let a = state.add_hypothesis(HypothesisDraft::new("a")).await;
        let b = state.add_hypothesis(HypothesisDraft::new("b")).await;

        let err = run_match(&state, &a, &b, &Broken, 32.0).await.unwrap_err();
        assert!(err.to_string().contains("judge unavailable"));
        assert!(!a.is_locked() && !b.is_locked());
        assert_eq!(a.try_acquire().unwrap().rating(), DEFAULT_RATING);
    }
}
