//! Error types shared across tickscope crates.

use thiserror::Error;

/// Structural problems with a bucket boundary sequence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundariesError {
    #[error("expected {expected} bucket boundaries, found {found}")]
    WrongCount { expected: usize, found: usize },

    #[error("last bucket boundary must be +Inf")]
    MissingSentinel,

    #[error("bucket boundary at index {index} is not finite")]
    NotFinite { index: usize },

    #[error("bucket boundary at index {index} is not strictly increasing")]
    NotIncreasing { index: usize },
}

/// Invalid values in `tickscope.toml`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("parser.bucket_count must be at least 2")]
    BucketCount,

    #[error("parser.threads must list at least one thread")]
    NoThreads,

    #[error("parser.reference_thread {0:?} is not in parser.threads")]
    UnknownReferenceThread(String),

    #[error("collector.{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("collector.latency_window must be greater than zero")]
    ZeroLatencyWindow,

    #[error("retention.tiers must not be empty")]
    NoTiers,

    #[error("retention tier {index} must have a larger max age than the previous tier")]
    UnorderedTiers { index: usize },

    #[error("retention tier {index} has a zero resolution")]
    ZeroResolution { index: usize },

    #[error("retention.max_entries must be greater than zero")]
    ZeroMaxEntries,
}
