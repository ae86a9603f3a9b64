//! Hypothesis ranking.
//!
//! - `selection`: priority scoring and pair selection over a snapshot
//! - `tournament`: one locked comparison plus the Elo update
//! - `engine`: RankingEngine tying selection to the task manager

pub mod engine;
pub mod selection;
pub mod tournament;

pub use engine::{COMPARE_TASK, RankingEngine};
pub use selection::{Proximity, RandomProximity, RankingPair, priority, select_pairs};
pub use tournament::{MatchResult, elo_update, run_match};
