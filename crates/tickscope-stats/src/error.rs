//! Error types for tickscope aggregates.

use thiserror::Error;

/// Result type alias for aggregate operations.
pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("counter is read-only")]
    ReadOnly,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
