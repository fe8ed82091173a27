//! tickscope-state: the perf log and its persistence.
//!
//! Backed by [redb](https://docs.rs/redb). The whole perf file lives in a
//! single JSON record that is replaced on every save, so a reader never sees
//! a half-written log.
//!
//! # Architecture
//!
//! ```text
//! TimeSeriesLog ── append ──▶ retention::optimize (down-sample, cap, expire)
//!       │
//!       ├── summary::chart_data / summary::summarize   (read projections)
//!       │
//!       └── PerfFile ──▶ PerfStore (redb "perf" table, key "current")
//! ```
//!
//! The `PerfStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod log;
pub mod retention;
pub mod store;
pub mod summary;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use log::{ThreadPoint, TimeSeriesLog};
pub use retention::{RetentionPolicy, RetentionReport};
pub use store::PerfStore;
pub use summary::{BucketShare, ChartData, Summary};
pub use types::*;
