//! Error types for metrics parsing and fetching.

use thiserror::Error;

use tickscope_core::{BoundariesError, Boundary};

pub type ParseResult<T> = Result<T, ParseError>;

pub type FetchResult<T> = Result<T, FetchError>;

/// Reasons a raw metrics sample is rejected. Every variant discards the
/// whole sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("metric family {0:?} not found in sample")]
    MissingFamily(String),

    #[error("required thread {0:?} not found in sample")]
    MissingThread(String),

    #[error("malformed metrics line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },

    #[error("invalid value {value:?} on line {line}")]
    InvalidValue { line: usize, value: String },

    #[error("invalid boundaries: {0}")]
    Boundaries(#[from] BoundariesError),

    #[error("thread {thread:?} bucket {index} has le={found}, expected le={expected}")]
    BucketMismatch {
        thread: String,
        index: usize,
        expected: Boundary,
        found: Boundary,
    },

    #[error("bucket line without le label for thread {thread:?} on line {line}")]
    MissingLe { thread: String, line: usize },

    #[error("thread {thread:?} has more than one {field} line")]
    DuplicateField { thread: String, field: &'static str },

    #[error("thread {thread:?} has no positive integer count")]
    InvalidCount { thread: String },

    #[error("thread {thread:?} has no positive finite sum")]
    InvalidSum { thread: String },

    #[error("thread {thread:?} has {found} buckets, expected {expected}")]
    BucketCount {
        thread: String,
        expected: usize,
        found: usize,
    },

    #[error("thread {thread:?} cumulative bucket {index} is lower than the previous bucket")]
    Retrograde { thread: String, index: usize },

    #[error("invalid metric family pattern: {0}")]
    Pattern(String),
}

/// Failures reading counters or memory from the managed process.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("HTTP handshake failed: {0}")]
    Handshake(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("response body is not valid UTF-8")]
    Encoding,

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("memory reading unavailable: {0}")]
    MemoryUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
