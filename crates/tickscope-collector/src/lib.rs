//! tickscope-collector: periodic sampling of the managed process.
//!
//! # Architecture
//!
//! ```text
//! Collector
//!   ├── tick()      ← ProcessMonitor::health() gate
//!   │     ├── join!(fetch_metrics, resident_bytes(pid), resident_bytes(self), player_count)
//!   │     ├── MetricsParser::parse()
//!   │     └── CollectorState::apply_sample() → gate, boundaries, baselines, append
//!   ├── on_boot() / on_close() → lifecycle markers
//!   ├── recent_stats() / chart_data() / summary() → read projections
//!   └── run() → interval loop until shutdown
//! ```

pub mod collector;
pub mod error;
pub mod monitor;
pub mod state;

pub use collector::{epoch_ms, Collector, RecentView, Sources, TickOutcome};
pub use error::{CollectorError, CollectorResult};
pub use monitor::{HttpProcessMonitor, ProcessHealth, ProcessMonitor};
pub use state::{CollectorPhase, CollectorState, Readings, RecentStats, SampleOutcome};
