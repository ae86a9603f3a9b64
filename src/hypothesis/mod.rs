//! Hypotheses and the shared research state they live in.

pub mod model;
pub mod state;

pub use model::{
    Article, DEFAULT_RATING, Hypothesis, HypothesisDraft, HypothesisGuard, HypothesisRecord,
    HypothesisView, Review, ReviewDelta,
};
pub use state::{Candidate, MatchHistory, PopulationSurvey, ResearchContext, ResearchState};
