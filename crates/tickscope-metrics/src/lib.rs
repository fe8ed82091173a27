//! tickscope-metrics: turning the managed process's counters into deltas.
//!
//! Parses the tick-time histogram text protocol, validates its structure,
//! computes deltas between cumulative snapshots, and provides the HTTP and
//! procfs sources the collector samples from.
//!
//! # Architecture
//!
//! ```text
//! MetricsSource (HTTP) ──► MetricsParser::parse() ──► Snapshot
//!                                                      │
//!                          Baseline::advance() ◄───────┘
//!                            ├── did_reset() → Reset (reseed)
//!                            └── diff()      → Delta
//!
//! MemorySource (procfs) ──► resident bytes
//! ```

pub mod delta;
pub mod error;
pub mod fetch;
pub mod memory;
pub mod parser;
pub mod source;

pub use delta::{diff, did_reset, Baseline, BaselineStep};
pub use error::{FetchError, FetchResult, ParseError, ParseResult};
pub use fetch::{HttpFetcher, HttpMetricsSource};
pub use memory::ProcMemorySource;
pub use parser::{MetricsParser, ParsedSample};
pub use source::{BoxFuture, MemorySource, MetricsSource, ProcessRef};
