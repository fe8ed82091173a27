//! Retention: multi-tier down-sampling plus size and age caps.
//!
//! Each data entry belongs to the first tier whose max age covers it.
//! Consecutive data entries of one tier are collected until they span at
//! least the tier's resolution, then replaced by a single entry whose
//! numeric fields are duration-weighted averages:
//!
//! ```text
//! value = Σ(value_i × duration_i) / Σ(duration_i)
//! ```
//!
//! A group spanning exactly one resolution is emitted, so 5-minute entries
//! fill a 5-minute tier one to one.
//!
//! The merged entry's `samples` is the sum of the group's, so projections
//! can turn averaged counters back into totals.
//!
//! Weighting by each entry's own duration keeps short entries (e.g. the
//! first one after a restart) from skewing the result. Boot and close
//! markers split groups and are never merged.

use std::collections::BTreeMap;

use tickscope_core::config::{RetentionConfig, RetentionTier};
use tickscope_core::{Delta, ThreadCounters};
use tickscope_stats::{Elapsed, Stopwatch};

use crate::types::{DataEntry, LogEntry};

/// Limits applied after every append.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub max_entries: usize,
    pub tiers: Vec<RetentionTier>,
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            tiers: config.tiers.clone(),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

impl RetentionPolicy {
    /// Entries older than this are dropped.
    pub fn max_age_ms(&self) -> Option<u64> {
        self.tiers.iter().map(RetentionTier::max_age_ms).max()
    }

    fn tier_for_age(&self, age_ms: u64) -> Option<&RetentionTier> {
        self.tiers.iter().find(|t| age_ms <= t.max_age_ms())
    }
}

/// What one optimization pass removed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionReport {
    /// Entries folded into merged entries.
    pub merged: usize,
    /// Entries dropped by the size cap.
    pub capped: usize,
    /// Entries dropped by the age cap.
    pub expired: usize,
    pub elapsed: Elapsed,
}

impl RetentionReport {
    pub fn removed(&self) -> usize {
        self.merged + self.capped + self.expired
    }
}

/// Down-sample, then enforce the size cap, then the age cap.
pub fn optimize(
    entries: &mut Vec<LogEntry>,
    policy: &RetentionPolicy,
    now: u64,
) -> RetentionReport {
    let mut stopwatch = Stopwatch::start();

    let before = entries.len();
    *entries = downsample(std::mem::take(entries), policy, now);
    let merged = before - entries.len();

    let capped = entries.len().saturating_sub(policy.max_entries);
    if capped > 0 {
        entries.drain(..capped);
    }

    let before = entries.len();
    if let Some(max_age) = policy.max_age_ms() {
        let cutoff = now.saturating_sub(max_age);
        entries.retain(|e| e.ts() >= cutoff);
    }
    let expired = before - entries.len();

    RetentionReport {
        merged,
        capped,
        expired,
        elapsed: stopwatch.stop(),
    }
}

/// One pass of tiered merging over the whole log.
pub fn downsample(entries: Vec<LogEntry>, policy: &RetentionPolicy, now: u64) -> Vec<LogEntry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut pending: Vec<DataEntry> = Vec::new();
    let mut pending_tier: Option<RetentionTier> = None;

    for entry in entries {
        let data = match entry {
            LogEntry::Data(data) => data,
            marker => {
                flush_unmerged(&mut pending, &mut out);
                pending_tier = None;
                out.push(marker);
                continue;
            }
        };

        let Some(tier) = policy.tier_for_age(now.saturating_sub(data.ts)).copied() else {
            // Past every tier: left for the age cap.
            flush_unmerged(&mut pending, &mut out);
            pending_tier = None;
            out.push(LogEntry::Data(data));
            continue;
        };

        if pending_tier != Some(tier) {
            flush_unmerged(&mut pending, &mut out);
            pending_tier = Some(tier);
        }

        let group_start = pending.first().map_or(data.start(), DataEntry::start);
        let group_end = data.ts;
        pending.push(data);

        if group_end.saturating_sub(group_start) >= tier.resolution_ms() {
            if pending.len() == 1 {
                flush_unmerged(&mut pending, &mut out);
            } else if let Some(merged) = merge_data(&pending) {
                out.push(LogEntry::Data(merged));
                pending.clear();
            }
        }
    }

    flush_unmerged(&mut pending, &mut out);
    out
}

fn flush_unmerged(pending: &mut Vec<DataEntry>, out: &mut Vec<LogEntry>) {
    out.extend(pending.drain(..).map(LogEntry::Data));
}

/// `Σ(v·d) / Σ(d)`, or `None` when there is nothing to weigh.
pub fn weighted_average<I>(items: I) -> Option<f64>
where
    I: IntoIterator<Item = (f64, u64)>,
{
    let (weighted, total) = items
        .into_iter()
        .fold((0.0f64, 0u64), |(acc, total), (value, duration)| {
            (acc + value * duration as f64, total + duration)
        });
    (total > 0).then(|| weighted / total as f64)
}

/// Merge a group of data entries into one spanning all of them.
///
/// Zero-length entries weigh as one millisecond. Optional readings average
/// over the entries that have them; integer counters are rounded.
pub fn merge_data(group: &[DataEntry]) -> Option<DataEntry> {
    let first = group.first()?;
    let last = group.last()?;
    let weight = |d: &DataEntry| d.duration.max(1);

    let players = weighted_average(
        group
            .iter()
            .filter_map(|d| d.players.map(|p| (p, weight(d)))),
    );
    let process_memory = weighted_average(
        group
            .iter()
            .filter_map(|d| d.process_memory.map(|m| (m, weight(d)))),
    );
    let aux_memory = weighted_average(
        group
            .iter()
            .filter_map(|d| d.aux_memory.map(|m| (m, weight(d)))),
    );

    let mut threads: BTreeMap<String, Vec<(&ThreadCounters, u64)>> = BTreeMap::new();
    for entry in group {
        for (thread, counters) in entry.perf.iter() {
            threads
                .entry(thread.clone())
                .or_default()
                .push((counters, weight(entry)));
        }
    }

    let perf: Delta = threads
        .into_iter()
        .map(|(thread, samples)| (thread, merge_counters(&samples)))
        .collect();

    Some(DataEntry {
        ts: last.ts,
        duration: last.ts.saturating_sub(first.start()),
        samples: group.iter().map(|d| d.samples).fold(0u32, u32::saturating_add),
        players,
        process_memory,
        aux_memory,
        perf,
    })
}

fn merge_counters(samples: &[(&ThreadCounters, u64)]) -> ThreadCounters {
    let width = samples.iter().map(|(c, _)| c.buckets.len()).max().unwrap_or(0);
    let average = |f: &dyn Fn(&ThreadCounters) -> f64| {
        weighted_average(samples.iter().map(|(c, w)| (f(c), *w))).unwrap_or(0.0)
    };

    ThreadCounters {
        count: average(&|c| c.count as f64).round() as u64,
        sum: average(&|c| c.sum),
        buckets: (0..width)
            .map(|i| average(&|c| c.buckets.get(i).copied().unwrap_or(0) as f64).round() as u64)
            .collect(),
    }
}
