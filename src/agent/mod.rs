//! Agents driving the research loop.
//!
//! - `capabilities`: generation, review and comparison traits
//! - `supervisor`: bootstrap phase scheduling

pub mod capabilities;
pub mod supervisor;

pub use capabilities::{Comparator, EchoCapabilities, Generator, MatchOutcome, Reviewer, Winner};
pub use supervisor::{BootstrapExit, BootstrapStep, GENERATE_TASK, REVIEW_TASK, Supervisor};
