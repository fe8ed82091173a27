//! Error types for the collector.

use thiserror::Error;

use tickscope_metrics::{FetchError, ParseError};
use tickscope_state::StateError;
use tickscope_stats::StatsError;

/// Result type alias for collector operations.
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Why a tick or lifecycle event was abandoned.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("metrics sample rejected: {0}")]
    Parse(#[from] ParseError),

    #[error("metrics fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("perf store error: {0}")]
    State(#[from] StateError),

    #[error("invalid collector configuration: {0}")]
    Stats(#[from] StatsError),
}
