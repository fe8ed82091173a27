//! Everything the collector mutates, in one owned struct.
//!
//! Sampling logic lives here as plain synchronous code; the async
//! [`Collector`](crate::Collector) only gathers inputs and persists.

use serde::Serialize;
use tracing::{debug, info, warn};

use tickscope_core::config::CollectorConfig;
use tickscope_core::{Boundaries, Delta};
use tickscope_metrics::{Baseline, BaselineStep, ParsedSample};
use tickscope_state::{DataEntry, LogEntry, PerfFile, RetentionPolicy, TimeSeriesLog, PERF_FILE_VERSION};

/// What the last tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorPhase {
    /// Waiting for the managed process.
    Idle,
    Sampling,
    /// Sample dropped: too few ticks to be meaningful.
    Gated,
    /// Histogram boundaries changed; history was discarded.
    BoundaryReset,
    /// Counters went backwards; a baseline was reseeded.
    CounterReset,
}

/// Readings gathered alongside the metrics sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Readings {
    pub players: Option<u32>,
    pub process_memory: Option<f64>,
    pub aux_memory: Option<f64>,
}

/// The latest live delta and readings, for "current" views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentStats {
    pub ts: u64,
    pub span_ms: u64,
    pub players: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_memory: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_memory: Option<f64>,
    pub perf: Delta,
}

/// Result of offering a parsed sample to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    Gated { min_count: u64 },
    Applied {
        phase: CollectorPhase,
        appended: bool,
        /// State worth persisting changed.
        dirty: bool,
    },
}

#[derive(Debug, Clone)]
pub struct CollectorState {
    pub boundaries: Option<Boundaries>,
    /// Advances every tick.
    pub live: Baseline,
    /// Advances once per save interval; its deltas become log entries.
    pub saved: Baseline,
    pub log: TimeSeriesLog,
    pub recent: Option<RecentStats>,
    pub phase: CollectorPhase,
}

impl CollectorState {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self::from_file(PerfFile::empty(), policy)
    }

    /// Resume from a loaded perf file. Baselines start empty: counters
    /// seen before the restart are not comparable.
    pub fn from_file(file: PerfFile, policy: RetentionPolicy) -> Self {
        Self {
            boundaries: file.last_boundaries,
            live: Baseline::new(),
            saved: Baseline::new(),
            log: TimeSeriesLog::from_entries(file.log, policy),
            recent: None,
            phase: CollectorPhase::Idle,
        }
    }

    pub fn to_file(&self) -> PerfFile {
        PerfFile {
            version: PERF_FILE_VERSION,
            last_boundaries: self.boundaries.clone(),
            log: self.log.entries().to_vec(),
        }
    }

    /// Gate, check boundaries, advance both baselines and append a data
    /// entry when the saved baseline produced one.
    pub fn apply_sample(
        &mut self,
        sample: ParsedSample,
        readings: Readings,
        now: u64,
        config: &CollectorConfig,
    ) -> SampleOutcome {
        let ParsedSample { boundaries, counters } = sample;

        if let BaselineStep::Delta { delta, .. } = self.live.evaluate(&counters, now) {
            if let Some(min_count) = delta.min_count().filter(|c| *c < config.min_ticks) {
                debug!(min_count, min_ticks = config.min_ticks, "too few ticks, sample dropped");
                self.phase = CollectorPhase::Gated;
                return SampleOutcome::Gated { min_count };
            }
        }

        let mut phase = CollectorPhase::Sampling;
        let mut dirty = false;

        if self.boundaries.as_ref() != Some(&boundaries) {
            if self.boundaries.is_some() {
                warn!(
                    discarded = self.log.len(),
                    "histogram boundaries changed, discarding perf history"
                );
                self.log.reset();
                self.live.clear();
                self.saved.clear();
                self.recent = None;
                phase = CollectorPhase::BoundaryReset;
            }
            self.boundaries = Some(boundaries);
            dirty = true;
        }

        match self.live.advance(&counters, now) {
            BaselineStep::Reset => {
                warn!(baseline = "live", "counters went backwards, baseline reseeded");
                phase = CollectorPhase::CounterReset;
            }
            BaselineStep::Delta { delta, span_ms } => {
                self.recent = Some(RecentStats {
                    ts: now,
                    span_ms,
                    players: readings.players,
                    process_memory: readings.process_memory,
                    aux_memory: readings.aux_memory,
                    perf: delta,
                });
            }
            BaselineStep::Seeded => {}
        }

        let mut appended = false;
        let save_interval_ms = config.save_interval().as_millis() as u64;
        match self.saved.evaluate(&counters, now) {
            BaselineStep::Reset => {
                warn!(baseline = "saved", "counters went backwards, baseline reseeded");
                self.saved.commit(&counters, now);
                phase = CollectorPhase::CounterReset;
            }
            step if self.saved.is_due(now, save_interval_ms) => {
                self.saved.commit(&counters, now);
                if let BaselineStep::Delta { delta, span_ms } = step {
                    self.log.append(
                        LogEntry::Data(DataEntry {
                            ts: now,
                            duration: span_ms,
                            samples: 1,
                            players: readings.players.map(f64::from),
                            process_memory: readings.process_memory,
                            aux_memory: readings.aux_memory,
                            perf: delta,
                        }),
                        now,
                    );
                    appended = true;
                    dirty = true;
                }
            }
            _ => {}
        }

        self.phase = phase;
        SampleOutcome::Applied { phase, appended, dirty }
    }

    /// The managed process came up at `ts`; its counters start from zero.
    pub fn boot(&mut self, ts: u64, duration: u64) {
        self.log.record_boot(ts, duration, ts);
        self.live = Baseline::zero_at(ts);
        self.saved = Baseline::zero_at(ts);
        self.recent = None;
        info!(ts, boot_secs = duration, "managed process booted");
    }

    /// The managed process went down at `ts`. Returns whether a close entry
    /// was written.
    pub fn close(&mut self, ts: u64, reason: &str) -> bool {
        let written = self.log.record_close(ts, reason, ts);
        self.live.clear();
        self.saved.clear();
        self.recent = None;
        self.phase = CollectorPhase::Idle;
        info!(ts, reason, written, "managed process closed");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickscope_core::{Boundary, Snapshot, ThreadCounters};

    const MIN: u64 = 60_000;

    fn config() -> CollectorConfig {
        CollectorConfig {
            tick_interval_secs: 60,
            save_interval_secs: 300,
            min_ticks: 100,
            latency_window: 60,
        }
    }

    fn boundaries(first: f64) -> Boundaries {
        Boundaries::try_new(vec![Boundary::Finite(first), Boundary::Inf], 2).unwrap()
    }

    /// Absolute counters with every tick in the first bucket.
    fn sample(count: u64) -> ParsedSample {
        sample_with(boundaries(0.05), count)
    }

    fn sample_with(boundaries: Boundaries, count: u64) -> ParsedSample {
        let counters: Snapshot = [(
            "svMain".to_string(),
            ThreadCounters { count, sum: count as f64 * 0.01, buckets: vec![count, 0] },
        )]
        .into_iter()
        .collect();
        ParsedSample { boundaries, counters }
    }

    fn readings() -> Readings {
        Readings {
            players: Some(8),
            process_memory: Some(1e9),
            aux_memory: None,
        }
    }

    fn state() -> CollectorState {
        CollectorState::new(RetentionPolicy::default())
    }

    fn data_entries(state: &CollectorState) -> Vec<&DataEntry> {
        state.log.entries().iter().filter_map(LogEntry::as_data).collect()
    }

    #[test]
    fn first_sample_seeds_both_baselines() {
        let mut s = state();
        let outcome = s.apply_sample(sample(1000), readings(), MIN, &config());
        assert_eq!(
            outcome,
            SampleOutcome::Applied { phase: CollectorPhase::Sampling, appended: false, dirty: true }
        );
        assert_eq!(s.boundaries, Some(boundaries(0.05)));
        assert_eq!(s.live.taken_at(), Some(MIN));
        assert_eq!(s.saved.taken_at(), Some(MIN));
        assert!(s.log.is_empty());
        assert!(s.recent.is_none());
    }

    #[test]
    fn saved_baseline_appends_once_per_interval() {
        let mut s = state();
        s.apply_sample(sample(1000), readings(), 0, &config());

        for minute in 1..=4 {
            let outcome = s.apply_sample(sample(1000 + minute * 600), readings(), minute * MIN, &config());
            assert!(matches!(outcome, SampleOutcome::Applied { appended: false, .. }));
            assert_eq!(s.recent.as_ref().unwrap().perf.get("svMain").unwrap().count, 600);
        }

        let outcome = s.apply_sample(sample(1000 + 5 * 600), readings(), 5 * MIN, &config());
        assert!(matches!(outcome, SampleOutcome::Applied { appended: true, dirty: true, .. }));

        let data = data_entries(&s);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].ts, 5 * MIN);
        assert_eq!(data[0].duration, 5 * MIN);
        assert_eq!(data[0].players, Some(8.0));
        assert_eq!(data[0].samples, 1);
        assert_eq!(data[0].perf.get("svMain").unwrap().count, 3000);
        assert_eq!(data[0].perf.get("svMain").unwrap().buckets, vec![3000, 0]);
    }

    #[test]
    fn unknown_player_count_is_not_recorded_as_zero() {
        let mut s = state();
        let slow = Readings { players: None, ..readings() };
        s.apply_sample(sample(1000), slow, 0, &config());
        let outcome = s.apply_sample(sample(4000), slow, 5 * MIN, &config());
        assert!(matches!(outcome, SampleOutcome::Applied { appended: true, .. }));

        let data = data_entries(&s);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].players, None);
        assert_eq!(data[0].process_memory, Some(1e9));
    }

    #[test]
    fn gated_sample_leaves_baselines_untouched() {
        let mut s = state();
        s.apply_sample(sample(1000), readings(), 0, &config());
        let before = s.clone();

        let outcome = s.apply_sample(sample(1050), readings(), MIN, &config());
        assert_eq!(outcome, SampleOutcome::Gated { min_count: 50 });
        assert_eq!(s.phase, CollectorPhase::Gated);
        assert_eq!(s.live, before.live);
        assert_eq!(s.saved, before.saved);
        assert!(s.log.is_empty());
    }

    #[test]
    fn identical_samples_are_gated_not_reset() {
        let mut s = state();
        s.apply_sample(sample(1000), readings(), 0, &config());
        let outcome = s.apply_sample(sample(1000), readings(), MIN, &config());
        assert_eq!(outcome, SampleOutcome::Gated { min_count: 0 });
    }

    #[test]
    fn count_decrease_reseeds_without_wiping() {
        let mut s = state();
        s.apply_sample(sample(1000), readings(), 0, &config());
        s.apply_sample(sample(4000), readings(), 5 * MIN, &config());
        assert_eq!(data_entries(&s).len(), 1);

        // Restart without a boot event: counters start over.
        let outcome = s.apply_sample(sample(200), readings(), 6 * MIN, &config());
        assert!(matches!(
            outcome,
            SampleOutcome::Applied { phase: CollectorPhase::CounterReset, appended: false, .. }
        ));
        assert_eq!(s.live.snapshot(), Some(&sample(200).counters));
        assert_eq!(s.saved.snapshot(), Some(&sample(200).counters));
        assert_eq!(data_entries(&s).len(), 1);

        // Next delta is measured from the reseeded snapshot.
        s.apply_sample(sample(800), readings(), 7 * MIN, &config());
        assert_eq!(s.recent.as_ref().unwrap().perf.get("svMain").unwrap().count, 600);
    }

    #[test]
    fn boundary_change_wipes_history() {
        let mut s = state();
        s.apply_sample(sample(1000), readings(), 0, &config());
        s.apply_sample(sample(4000), readings(), 5 * MIN, &config());
        assert_eq!(s.log.len(), 1);

        let outcome = s.apply_sample(sample_with(boundaries(0.1), 4600), readings(), 6 * MIN, &config());
        assert_eq!(
            outcome,
            SampleOutcome::Applied { phase: CollectorPhase::BoundaryReset, appended: false, dirty: true }
        );
        assert!(s.log.is_empty());
        assert_eq!(s.boundaries, Some(boundaries(0.1)));
        assert_eq!(s.live.taken_at(), Some(6 * MIN));
        assert_eq!(s.saved.taken_at(), Some(6 * MIN));
    }

    #[test]
    fn boot_anchors_deltas_at_zero() {
        let mut s = state();
        s.apply_sample(sample(1000), readings(), 0, &config());
        s.boot(10 * MIN, 25);

        // Counters since boot are the delta.
        s.apply_sample(sample(3000), readings(), 15 * MIN, &config());
        let data = data_entries(&s);
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].duration, 5 * MIN);
        assert_eq!(data[0].perf.get("svMain").unwrap().count, 3000);
        assert!(s.log.entries()[0].is_boot());
    }

    #[test]
    fn close_without_data_drops_boot() {
        let mut s = state();
        s.boot(MIN, 10);
        assert!(!s.close(2 * MIN, "crash"));
        assert!(s.log.is_empty());
        assert!(s.live.is_empty());
        assert_eq!(s.phase, CollectorPhase::Idle);
    }

    #[test]
    fn file_round_trip_keeps_log_and_boundaries() {
        let mut s = state();
        s.apply_sample(sample(1000), readings(), 0, &config());
        s.apply_sample(sample(4000), readings(), 5 * MIN, &config());

        let file = s.to_file();
        let resumed = CollectorState::from_file(file.clone(), RetentionPolicy::default());
        assert_eq!(resumed.to_file(), file);
        assert!(resumed.live.is_empty());
    }
}
