//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of concurrent workers in the pool.
    pub worker_count: usize,
    /// Interval between checkpoint snapshots.
    pub checkpoint_interval: Duration,
    /// Destination of the checkpoint JSON file.
    pub checkpoint_path: PathBuf,
    /// Supervisor poll interval.
    pub poll_interval: Duration,
    /// Reviewed, unlocked hypotheses required to leave bootstrap.
    pub min_reviewed: usize,
    /// Maximum comparison pairs proposed per ranking pass.
    pub ranking_pairs: usize,
    /// Weight of one combined-version step in the priority score.
    pub steep_multiplier: f64,
    /// Elo K factor applied after each comparison.
    pub elo_k_factor: f64,
    /// Optional upper bound on a single work item's runtime.
    pub action_timeout: Option<Duration>,
    /// Directory for a daily-rotated log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            checkpoint_interval: Duration::from_secs(5),
            checkpoint_path: PathBuf::from("task_history.json"),
            poll_interval: Duration::from_secs(1),
            min_reviewed: 3,
            ranking_pairs: 3,
            steep_multiplier: 1000.0,
            elo_k_factor: 32.0,
            action_timeout: None,
            log_dir: None,
        }
    }
}

impl SchedulerConfig {
    /// Build config from `CO_SCIENTIST_*` environment variables.
    /// Unset variables keep their defaults; unparseable ones are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let worker_count = env_parse("CO_SCIENTIST_WORKERS")?.unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CO_SCIENTIST_WORKERS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let checkpoint_interval = env_parse::<u64>("CO_SCIENTIST_CHECKPOINT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.checkpoint_interval);
        if checkpoint_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "CO_SCIENTIST_CHECKPOINT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let checkpoint_path = std::env::var("CO_SCIENTIST_CHECKPOINT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.checkpoint_path);

        let poll_interval = env_parse::<u64>("CO_SCIENTIST_POLL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let action_timeout = env_parse::<u64>("CO_SCIENTIST_ACTION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .or(defaults.action_timeout);

        Ok(Self {
            worker_count,
            checkpoint_interval,
            checkpoint_path,
            poll_interval,
            min_reviewed: env_parse("CO_SCIENTIST_MIN_REVIEWED")?.unwrap_or(defaults.min_reviewed),
            ranking_pairs: env_parse("CO_SCIENTIST_RANKING_PAIRS")?
                .unwrap_or(defaults.ranking_pairs),
            steep_multiplier: env_parse("CO_SCIENTIST_STEEP_MULTIPLIER")?
                .unwrap_or(defaults.steep_multiplier),
            elo_k_factor: env_parse("CO_SCIENTIST_ELO_K")?.unwrap_or(defaults.elo_k_factor),
            action_timeout,
            log_dir: std::env::var("CO_SCIENTIST_LOG_DIR").ok().map(PathBuf::from),
        })
    }

    /// Ranking parameters derived from this config.
    pub fn ranking(&self) -> RankingConfig {
        RankingConfig {
            pairs: self.ranking_pairs,
            steep_multiplier: self.steep_multiplier,
            ..RankingConfig::default()
        }
    }
}

/// Ranking engine parameters.
#[derive(Debug, Clone)]
pub struct RankingConfig {
    /// Maximum pairs returned per selection pass.
    pub pairs: usize,
    /// Number of weighted-sampled first candidates before the fallback pool.
    pub first_candidates: usize,
    /// Weight of one combined-version step in the priority score.
    pub steep_multiplier: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            pairs: 3,
            first_candidates: 3,
            steep_multiplier: 1000.0,
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        Err(_) => Ok(None),
    }
}
