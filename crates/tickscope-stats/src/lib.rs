//! tickscope-stats: small reusable aggregates for the collector and
//! dashboard projections.
//!
//! # Components
//!
//! ```text
//! Counter            label → count, with sorted views and a read-only mode
//! QuantileEstimator  bounded sample window → p5/p25/p50/p75/p95
//! Stopwatch          monotonic timer reporting ns / ms / s at once
//! ```

pub mod counter;
pub mod error;
pub mod quantile;
pub mod stopwatch;

pub use counter::{Counter, SortOrder};
pub use error::{StatsError, StatsResult};
pub use quantile::{Percentiles, QuantileEstimator, QuantileResult};
pub use stopwatch::{Elapsed, Stopwatch};
