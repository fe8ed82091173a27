//! TimeSeriesLog: the in-memory perf log with retention applied on append.

use serde::Serialize;
use tracing::debug;

use tickscope_core::ThreadCounters;

use crate::retention::{self, RetentionPolicy, RetentionReport};
use crate::types::{DataEntry, Lifespan, LogEntry};

/// One data entry projected onto a single thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadPoint {
    pub ts: u64,
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_memory: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux_memory: Option<f64>,
    pub counters: ThreadCounters,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesLog {
    entries: Vec<LogEntry>,
    policy: RetentionPolicy,
}

impl TimeSeriesLog {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self::from_entries(Vec::new(), policy)
    }

    /// Wrap entries loaded from the store. Retention is applied on the next
    /// append.
    pub fn from_entries(entries: Vec<LogEntry>, policy: RetentionPolicy) -> Self {
        Self { entries, policy }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Append an entry, then down-sample and trim.
    pub fn append(&mut self, entry: LogEntry, now: u64) -> RetentionReport {
        self.entries.push(entry);
        self.optimize(now)
    }

    pub fn optimize(&mut self, now: u64) -> RetentionReport {
        let report = retention::optimize(&mut self.entries, &self.policy, now);
        if report.removed() > 0 {
            debug!(
                merged = report.merged,
                capped = report.capped,
                expired = report.expired,
                remaining = self.entries.len(),
                elapsed_ms = report.elapsed.millis,
                "perf log optimized"
            );
        }
        report
    }

    /// Record a boot. A boot directly after another boot replaces it: the
    /// earlier start never produced data.
    pub fn record_boot(&mut self, ts: u64, duration: u64, now: u64) -> RetentionReport {
        if self.entries.last().is_some_and(LogEntry::is_boot) {
            self.entries.pop();
        }
        self.append(LogEntry::Boot { ts, duration }, now)
    }

    /// Record a close. Returns false when nothing was written: a boot with
    /// no data after it is dropped instead, and a close needs something to
    /// close.
    pub fn record_close(&mut self, ts: u64, reason: impl Into<String>, now: u64) -> bool {
        match self.entries.last() {
            Some(LogEntry::Boot { .. }) => {
                self.entries.pop();
                false
            }
            Some(LogEntry::Data(_)) => {
                self.append(
                    LogEntry::Close {
                        ts,
                        reason: reason.into(),
                    },
                    now,
                );
                true
            }
            Some(LogEntry::Close { .. }) | None => false,
        }
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn last_data(&self) -> Option<&DataEntry> {
        self.entries.iter().rev().find_map(LogEntry::as_data)
    }

    /// Data entries that carry `thread`, projected onto it.
    pub fn series_for_thread(&self, thread: &str) -> Vec<ThreadPoint> {
        self.entries
            .iter()
            .filter_map(LogEntry::as_data)
            .filter_map(|d| {
                d.perf.get(thread).map(|counters| ThreadPoint {
                    ts: d.ts,
                    duration: d.duration,
                    players: d.players,
                    process_memory: d.process_memory,
                    aux_memory: d.aux_memory,
                    counters: counters.clone(),
                })
            })
            .collect()
    }

    /// Split the log into runs of the managed process.
    pub fn lifespans(&self) -> Vec<Lifespan> {
        let mut spans = Vec::new();
        let mut current: Option<Lifespan> = None;

        for entry in &self.entries {
            match entry {
                LogEntry::Boot { ts, duration } => {
                    spans.extend(current.take());
                    current = Some(Lifespan {
                        start: *ts,
                        end: None,
                        boot_duration: Some(*duration),
                        close_reason: None,
                        data_points: 0,
                    });
                }
                LogEntry::Data(data) => {
                    let span = current.get_or_insert_with(|| Lifespan {
                        start: data.start(),
                        end: None,
                        boot_duration: None,
                        close_reason: None,
                        data_points: 0,
                    });
                    span.end = Some(data.ts);
                    span.data_points += 1;
                }
                LogEntry::Close { ts, reason } => {
                    if let Some(mut span) = current.take() {
                        span.end = Some(*ts);
                        span.close_reason = Some(reason.clone());
                        spans.push(span);
                    }
                }
            }
        }

        spans.extend(current);
        spans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickscope_core::config::RetentionTier;

    const MIN: u64 = 60_000;

    fn data(ts: u64) -> LogEntry {
        LogEntry::Data(DataEntry {
            ts,
            duration: MIN,
            samples: 1,
            players: Some(4.0),
            process_memory: None,
            aux_memory: None,
            perf: [
                (
                    "svMain".to_string(),
                    ThreadCounters { count: 600, sum: 3.0, buckets: vec![600, 0] },
                ),
                (
                    "svSync".to_string(),
                    ThreadCounters { count: 1200, sum: 1.0, buckets: vec![1200, 0] },
                ),
            ]
            .into_iter()
            .collect(),
        })
    }

    fn minute_log(max_entries: usize) -> TimeSeriesLog {
        TimeSeriesLog::new(RetentionPolicy {
            max_entries,
            tiers: vec![RetentionTier::new(7 * 24 * 3600, 60)],
        })
    }

    #[test]
    fn append_trims_to_most_recent() {
        let entries: Vec<LogEntry> = (1..=1000).map(|i| data(i * MIN)).collect();
        let mut log = TimeSeriesLog::from_entries(entries, minute_log(720).policy().clone());

        log.append(data(1001 * MIN), 1001 * MIN);
        assert_eq!(log.len(), 720);
        assert_eq!(log.entries().first().unwrap().ts(), 282 * MIN);
        assert_eq!(log.last_data().unwrap().ts, 1001 * MIN);
    }

    #[test]
    fn second_boot_replaces_first() {
        let mut log = minute_log(100);
        log.record_boot(MIN, 10, MIN);
        log.record_boot(2 * MIN, 12, 2 * MIN);
        assert_eq!(log.entries(), &[LogEntry::Boot { ts: 2 * MIN, duration: 12 }]);
    }

    #[test]
    fn close_after_data_is_written() {
        let mut log = minute_log(100);
        log.record_boot(0, 10, 0);
        log.append(data(MIN), MIN);
        assert!(log.record_close(MIN + 5, "stopped", MIN + 5));
        assert_eq!(log.len(), 3);
        assert!(!log.record_close(MIN + 6, "stopped", MIN + 6));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn close_after_bare_boot_drops_boot() {
        let mut log = minute_log(100);
        log.append(data(MIN), MIN);
        log.record_boot(2 * MIN, 10, 2 * MIN);
        assert!(!log.record_close(3 * MIN, "crash", 3 * MIN));
        assert_eq!(log.entries(), &[data(MIN)]);
    }

    #[test]
    fn close_on_empty_log_is_ignored() {
        let mut log = minute_log(100);
        assert!(!log.record_close(MIN, "stopped", MIN));
        assert!(log.is_empty());
    }

    #[test]
    fn series_projects_one_thread() {
        let mut log = minute_log(100);
        log.record_boot(0, 10, 0);
        log.append(data(MIN), MIN);
        log.append(data(2 * MIN), 2 * MIN);

        let series = log.series_for_thread("svSync");
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].counters.count, 1200);
        assert_eq!(series[1].ts, 2 * MIN);
        assert!(log.series_for_thread("svNetwork").is_empty());
    }

    #[test]
    fn lifespans_follow_markers() {
        let mut log = minute_log(100);
        // Data before any observed boot.
        log.append(data(MIN), MIN);
        log.record_close(MIN + 1, "crash", MIN + 1);
        log.record_boot(3 * MIN, 20, 3 * MIN);
        log.append(data(4 * MIN), 4 * MIN);
        log.append(data(5 * MIN), 5 * MIN);

        let spans = log.lifespans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, Some(MIN + 1));
        assert_eq!(spans[0].close_reason.as_deref(), Some("crash"));
        assert_eq!(spans[0].boot_duration, None);

        assert_eq!(spans[1].start, 3 * MIN);
        assert_eq!(spans[1].end, Some(5 * MIN));
        assert_eq!(spans[1].boot_duration, Some(20));
        assert_eq!(spans[1].data_points, 2);
    }

    #[test]
    fn reset_empties_log() {
        let mut log = minute_log(100);
        log.append(data(MIN), MIN);
        log.reset();
        assert!(log.is_empty());
        assert!(log.last_data().is_none());
    }
}
