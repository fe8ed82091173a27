//! Read projections of the perf log for dashboards: chart series and
//! windowed summaries.

use serde::Serialize;

use tickscope_core::{Boundaries, ThreadCounters};
use tickscope_stats::{Counter, Percentiles, QuantileEstimator, SortOrder};

use crate::log::{ThreadPoint, TimeSeriesLog};
use crate::types::LogEntry;

/// Everything needed to chart one thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub thread: String,
    pub boundaries: Option<Boundaries>,
    pub series: Vec<ThreadPoint>,
    /// Boot and close markers, for annotating the chart.
    pub events: Vec<LogEntry>,
}

pub fn chart_data(log: &TimeSeriesLog, boundaries: Option<&Boundaries>, thread: &str) -> ChartData {
    ChartData {
        thread: thread.to_string(),
        boundaries: boundaries.cloned(),
        series: log.series_for_thread(thread),
        events: log
            .entries()
            .iter()
            .filter(|e| !e.is_data())
            .cloned()
            .collect(),
    }
}

/// Ticks that fell in one bucket over the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketShare {
    pub label: String,
    pub ticks: u64,
    /// Fraction of all ticks in the window, `0.0..=1.0`.
    pub share: f64,
}

/// Aggregate view of the last `window_ms` of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub thread: String,
    pub from: u64,
    pub to: u64,
    pub data_points: usize,
    pub total_ticks: u64,
    /// Tick-time distribution in boundary order.
    pub buckets: Vec<BucketShare>,
    /// Label of the bucket holding the most ticks.
    pub dominant_bucket: Option<String>,
    pub mean_tick_ms: Option<f64>,
    /// Share of the window covered by data entries, in percent.
    pub uptime_pct: f64,
    pub players: Option<Percentiles>,
    pub median_players: Option<f64>,
    pub median_process_memory: Option<f64>,
    pub median_aux_memory: Option<f64>,
    /// Boots observed in the window.
    pub restarts: usize,
    /// Close reasons in the window, most frequent first.
    pub close_reasons: Vec<(String, u64)>,
}

/// Summarize `thread` over `[now - window_ms, now]`.
///
/// Data entries count when they end inside the window; their covered time
/// is clipped to the window for the uptime figure.
pub fn summarize(
    log: &TimeSeriesLog,
    boundaries: Option<&Boundaries>,
    thread: &str,
    window_ms: u64,
    now: u64,
) -> Summary {
    let from = now.saturating_sub(window_ms);
    let in_window: Vec<&LogEntry> = log
        .entries()
        .iter()
        .filter(|e| e.ts() > from && e.ts() <= now)
        .collect();
    let data: Vec<_> = in_window.iter().filter_map(|e| e.as_data()).collect();

    // Merged entries hold per-sample averages; scale them back to totals.
    let mut totals = ThreadCounters::default();
    for (counters, samples) in data
        .iter()
        .filter_map(|d| d.perf.get(thread).map(|c| (c, u64::from(d.samples))))
    {
        if totals.buckets.len() < counters.buckets.len() {
            totals.buckets.resize(counters.buckets.len(), 0);
        }
        for (slot, n) in totals.buckets.iter_mut().zip(&counters.buckets) {
            *slot = slot.saturating_add(n.saturating_mul(samples));
        }
        totals.count = totals.count.saturating_add(counters.count.saturating_mul(samples));
        totals.sum += counters.sum * samples as f64;
    }
    let bucket_ticks = &totals.buckets;

    let labels: Vec<String> = (0..bucket_ticks.len())
        .map(|i| match boundaries.and_then(|b| b.get(i)) {
            Some(boundary) => boundary.label(),
            None => format!("bucket{i}"),
        })
        .collect();
    let distribution = Counter::read_only(labels.iter().cloned().zip(bucket_ticks.iter().copied()));
    let bucket_total = distribution.total();
    let buckets = labels
        .iter()
        .map(|label| {
            let ticks = distribution.get(label);
            BucketShare {
                label: label.clone(),
                ticks,
                share: if bucket_total > 0 {
                    ticks as f64 / bucket_total as f64
                } else {
                    0.0
                },
            }
        })
        .collect();
    let dominant_bucket = distribution
        .sorted_by_value(SortOrder::Descending)
        .into_iter()
        .find(|(_, ticks)| *ticks > 0)
        .map(|(label, _)| label.to_string());

    let covered: u64 = data
        .iter()
        .map(|d| d.ts.min(now).saturating_sub(d.start().max(from)))
        .sum();
    let uptime_pct = if window_ms > 0 {
        (covered as f64 / window_ms as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    let players = percentiles(data.iter().filter_map(|d| d.players));
    let median_process_memory =
        percentiles(data.iter().filter_map(|d| d.process_memory)).map(|p| p.p50);
    let median_aux_memory = percentiles(data.iter().filter_map(|d| d.aux_memory)).map(|p| p.p50);

    let restarts = in_window.iter().filter(|e| e.is_boot()).count();
    let reasons = Counter::read_only(in_window.iter().filter_map(|e| match e {
        LogEntry::Close { reason, .. } => Some((reason.clone(), 1)),
        _ => None,
    }));
    let close_reasons = reasons
        .sorted_by_value(SortOrder::Descending)
        .into_iter()
        .map(|(reason, n)| (reason.to_string(), n))
        .collect();

    Summary {
        thread: thread.to_string(),
        from,
        to: now,
        data_points: data.len(),
        total_ticks: totals.count,
        buckets,
        dominant_bucket,
        mean_tick_ms: totals.mean().map(|secs| secs * 1000.0),
        uptime_pct,
        median_players: players.map(|p| p.p50),
        players,
        median_process_memory,
        median_aux_memory,
        restarts,
        close_reasons,
    }
}

fn percentiles(values: impl Iterator<Item = f64>) -> Option<Percentiles> {
    let values: Vec<f64> = values.collect();
    let mut estimator = QuantileEstimator::new(values.len().max(1), 1).ok()?;
    for value in values {
        estimator.push(value);
    }
    estimator.result().percentiles()
}
