//! Perf collector: samples the managed process on a fixed interval and
//! keeps the perf log.
//!
//! Each tick fetches the metrics text and the memory readings
//! concurrently, hands the parsed sample to [`CollectorState`], and saves
//! the perf file when the state changed. A failed save is logged and the
//! in-memory state stays authoritative.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use tickscope_core::TickscopeConfig;
use tickscope_core::config::CollectorConfig;
use tickscope_metrics::{FetchResult, MemorySource, MetricsParser, MetricsSource, ProcessRef};
use tickscope_state::summary::{self, ChartData, Summary};
use tickscope_state::{Lifespan, PerfStore, RetentionPolicy};
use tickscope_stats::{Elapsed, QuantileEstimator, QuantileResult, Stopwatch};

use crate::error::CollectorResult;
use crate::monitor::{ProcessHealth, ProcessMonitor};
use crate::state::{CollectorPhase, CollectorState, Readings, RecentStats, SampleOutcome};

/// What one call to [`Collector::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Overlapped,
    /// The managed process was not connectable.
    Skipped(ProcessHealth),
    Gated { min_count: u64 },
    Sampled { phase: CollectorPhase, appended: bool },
}

/// Sources the collector samples from.
#[derive(Clone)]
pub struct Sources {
    pub metrics: Arc<dyn MetricsSource>,
    pub memory: Arc<dyn MemorySource>,
    pub monitor: Arc<dyn ProcessMonitor>,
}

/// Live view for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentView {
    pub phase: CollectorPhase,
    pub recent: Option<RecentStats>,
    /// Metrics fetch latency over the last ticks, in milliseconds.
    pub fetch_latency: QuantileResult,
}

pub struct Collector {
    state: Mutex<CollectorState>,
    store: PerfStore,
    sources: Sources,
    parser: MetricsParser,
    config: CollectorConfig,
    reference_thread: String,
    in_flight: AtomicBool,
    fetch_latency: Mutex<QuantileEstimator>,
}

impl Collector {
    /// Build a collector, resuming from whatever the store holds.
    pub fn new(config: &TickscopeConfig, store: PerfStore, sources: Sources) -> CollectorResult<Self> {
        let parser = MetricsParser::new(&config.parser)?;
        let fetch_latency = QuantileEstimator::new(config.collector.latency_window, 1)?;
        let file = store.load_validated(config.parser.bucket_count);
        info!(
            entries = file.log.len(),
            has_boundaries = file.last_boundaries.is_some(),
            "perf log resumed"
        );

        Ok(Self {
            state: Mutex::new(CollectorState::from_file(
                file,
                RetentionPolicy::from(&config.retention),
            )),
            store,
            sources,
            parser,
            config: config.collector.clone(),
            reference_thread: config.parser.reference_thread.clone(),
            in_flight: AtomicBool::new(false),
            fetch_latency: Mutex::new(fetch_latency),
        })
    }

    /// Sample once at `now` (epoch milliseconds).
    pub async fn tick(&self, now: u64) -> CollectorResult<TickOutcome> {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!("previous tick still running, skipping");
            return Ok(TickOutcome::Overlapped);
        };

        let health = self.sources.monitor.health().await;
        if !health.is_connectable() {
            return Ok(TickOutcome::Skipped(health));
        }

        let pid = self.sources.monitor.pid().await;
        let ((raw, fetch_time), process_memory, aux_memory, players) = tokio::join!(
            self.fetch_metrics(),
            self.read_memory(pid.map(ProcessRef::Pid)),
            self.read_memory(Some(ProcessRef::Current)),
            self.sources.monitor.player_count(),
        );
        self.fetch_latency.lock().await.push(fetch_time.millis);

        let raw = raw.inspect_err(|e| error!(error = %e, "metrics fetch failed"))?;
        let sample = self
            .parser
            .parse(&raw)
            .inspect_err(|e| warn!(error = %e, "metrics sample rejected"))?;

        let readings = Readings {
            players,
            process_memory,
            aux_memory,
        };

        let mut state = self.state.lock().await;
        match state.apply_sample(sample, readings, now, &self.config) {
            SampleOutcome::Gated { min_count } => Ok(TickOutcome::Gated { min_count }),
            SampleOutcome::Applied { phase, appended, dirty } => {
                if dirty {
                    self.persist(&state);
                }
                debug!(?phase, appended, entries = state.log.len(), "tick sampled");
                Ok(TickOutcome::Sampled { phase, appended })
            }
        }
    }

    async fn fetch_metrics(&self) -> (FetchResult<String>, Elapsed) {
        let mut stopwatch = Stopwatch::start();
        let result = self.sources.metrics.fetch_metrics().await;
        (result, stopwatch.stop())
    }

    async fn read_memory(&self, process: Option<ProcessRef>) -> Option<f64> {
        let process = process?;
        match self.sources.memory.resident_bytes(process).await {
            Ok(bytes) => Some(bytes as f64),
            Err(e) => {
                debug!(?process, error = %e, "memory reading unavailable");
                None
            }
        }
    }

    /// Record that the managed process came up at `ts`, taking
    /// `duration_secs` to start.
    pub async fn on_boot(&self, ts: u64, duration_secs: u64) {
        let mut state = self.state.lock().await;
        state.boot(ts, duration_secs);
        self.persist(&state);
    }

    /// Record that the managed process went down at `ts`.
    pub async fn on_close(&self, ts: u64, reason: &str) {
        let mut state = self.state.lock().await;
        state.close(ts, reason);
        self.persist(&state);
    }

    fn persist(&self, state: &CollectorState) {
        if let Err(e) = self.store.save(&state.to_file()) {
            error!(error = %e, "failed to save perf log");
        }
    }

    pub async fn phase(&self) -> CollectorPhase {
        self.state.lock().await.phase
    }

    pub async fn recent_stats(&self) -> RecentView {
        let state = self.state.lock().await;
        RecentView {
            phase: state.phase,
            recent: state.recent.clone(),
            fetch_latency: self.fetch_latency.lock().await.result(),
        }
    }

    /// Chart data for `thread`, or the reference thread.
    pub async fn chart_data(&self, thread: Option<&str>) -> ChartData {
        let state = self.state.lock().await;
        let thread = thread.unwrap_or(&self.reference_thread);
        summary::chart_data(&state.log, state.boundaries.as_ref(), thread)
    }

    /// Summary of the reference thread over the last `window`.
    pub async fn summary(&self, window: Duration, now: u64) -> Summary {
        let state = self.state.lock().await;
        summary::summarize(
            &state.log,
            state.boundaries.as_ref(),
            &self.reference_thread,
            window.as_millis() as u64,
            now,
        )
    }

    pub async fn lifespans(&self) -> Vec<Lifespan> {
        self.state.lock().await.log.lifespans()
    }

    /// Tick on the configured interval until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.config.tick_interval_secs,
            save_secs = self.config.save_interval_secs,
            min_ticks = self.config.min_ticks,
            "perf collector started"
        );

        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(epoch_ms()).await {
                        Ok(outcome) => debug!(?outcome, "tick finished"),
                        // Already logged where it happened.
                        Err(e) => debug!(error = %e, "tick abandoned"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("perf collector shutting down");
                    break;
                }
            }
        }
    }
}

/// Clears the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Milliseconds since the unix epoch.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
