//! Counter deltas between cumulative snapshots.
//!
//! `count` and `sum` only ever grow while the managed process runs. A
//! decrease means the process restarted without a boot event being seen,
//! so the reference snapshot is discarded instead of producing negative
//! deltas.

use std::collections::BTreeMap;

use tickscope_core::{Delta, Snapshot, ThreadCounters};

/// Elementwise `new - old` per thread. With no `old`, diffs against an
/// all-zero snapshot, so the result equals `new`.
///
/// Callers must check [`did_reset`] first; values that went backwards are
/// clamped to zero here.
pub fn diff(new: &Snapshot, old: Option<&Snapshot>) -> Delta {
    let mut out = BTreeMap::new();
    for (thread, current) in new.iter() {
        let counters = match old.and_then(|o| o.get(thread)) {
            Some(previous) => ThreadCounters {
                count: current.count.saturating_sub(previous.count),
                sum: (current.sum - previous.sum).max(0.0),
                buckets: current
                    .buckets
                    .iter()
                    .enumerate()
                    .map(|(i, b)| b.saturating_sub(previous.buckets.get(i).copied().unwrap_or(0)))
                    .collect(),
            },
            None => current.clone(),
        };
        out.insert(thread.clone(), counters);
    }
    Delta::new(out)
}

/// True iff any thread's `count` or `sum` in `old` is strictly greater than
/// in `new`. Threads missing from `new` are not compared.
pub fn did_reset(new: &Snapshot, old: &Snapshot) -> bool {
    old.iter().any(|(thread, previous)| {
        new.get(thread)
            .is_some_and(|current| previous.count > current.count || previous.sum > current.sum)
    })
}

/// Outcome of offering a snapshot to a [`Baseline`].
#[derive(Debug, Clone, PartialEq)]
pub enum BaselineStep {
    /// There was no reference yet; the snapshot became the reference.
    Seeded,
    /// Counters went backwards; the reference was replaced, no delta.
    Reset,
    /// Change since the reference, covering `span_ms` milliseconds.
    Delta { delta: Delta, span_ms: u64 },
}

/// A reference snapshot and the time it was taken.
///
/// A baseline can also be anchored at a moment without a snapshot (see
/// [`Baseline::zero_at`]): the process just booted, so its counters started
/// from zero at that time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    snapshot: Option<Snapshot>,
    taken_at: Option<u64>,
}

impl Baseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// A baseline for a process that started at `ts`, with all counters at
    /// zero.
    pub fn zero_at(ts: u64) -> Self {
        Self {
            snapshot: None,
            taken_at: Some(ts),
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn taken_at(&self) -> Option<u64> {
        self.taken_at
    }

    pub fn is_empty(&self) -> bool {
        self.taken_at.is_none()
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
        self.taken_at = None;
    }

    /// What offering `current` at `now` would yield, without changing the
    /// baseline.
    pub fn evaluate(&self, current: &Snapshot, now: u64) -> BaselineStep {
        match (&self.snapshot, self.taken_at) {
            (Some(old), _) if did_reset(current, old) => BaselineStep::Reset,
            (old, Some(at)) => BaselineStep::Delta {
                delta: diff(current, old.as_ref()),
                span_ms: now.saturating_sub(at),
            },
            (_, None) => BaselineStep::Seeded,
        }
    }

    /// Make `current` the reference.
    pub fn commit(&mut self, current: &Snapshot, now: u64) {
        self.snapshot = Some(current.clone());
        self.taken_at = Some(now);
    }

    /// Evaluate and then move the reference to `current`, whatever the
    /// outcome.
    pub fn advance(&mut self, current: &Snapshot, now: u64) -> BaselineStep {
        let step = self.evaluate(current, now);
        self.commit(current, now);
        step
    }

    /// Whether at least `min_interval_ms` passed since the reference was
    /// taken. An empty baseline is always due.
    pub fn is_due(&self, now: u64, min_interval_ms: u64) -> bool {
        self.taken_at
            .is_none_or(|at| now.saturating_sub(at) >= min_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(count: u64, sum: f64, buckets: &[u64]) -> ThreadCounters {
        ThreadCounters {
            count,
            sum,
            buckets: buckets.to_vec(),
        }
    }

    fn snapshot(main: ThreadCounters, sync: ThreadCounters) -> Snapshot {
        [("svMain".to_string(), main), ("svSync".to_string(), sync)]
            .into_iter()
            .collect()
    }

    fn sample_a() -> Snapshot {
        snapshot(counters(100, 2.0, &[80, 15, 5]), counters(50, 0.5, &[50, 0, 0]))
    }

    fn sample_b() -> Snapshot {
        snapshot(counters(160, 3.0, &[120, 30, 10]), counters(90, 0.75, &[88, 2, 0]))
    }

    #[test]
    fn diff_against_none_is_identity() {
        for snap in [sample_a(), sample_b()] {
            let delta = diff(&snap, None);
            assert_eq!(delta.into_inner(), snap.into_inner());
        }
    }

    #[test]
    fn diff_subtracts_elementwise() {
        let delta = diff(&sample_b(), Some(&sample_a()));
        let main = delta.get("svMain").unwrap();
        assert_eq!(main.count, 60);
        assert_eq!(main.sum, 1.0);
        assert_eq!(main.buckets, vec![40, 15, 5]);
        let sync = delta.get("svSync").unwrap();
        assert_eq!(sync.buckets, vec![38, 2, 0]);
    }

    #[test]
    fn identical_samples_give_zero_delta_and_no_reset() {
        let a = sample_a();
        assert!(!did_reset(&a, &a));
        let delta = diff(&a, Some(&a));
        for (_, t) in delta.iter() {
            assert_eq!(t.count, 0);
            assert_eq!(t.sum, 0.0);
            assert!(t.buckets.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn reset_detected_on_count_decrease() {
        let old = sample_b();
        let mut threads = sample_b().into_inner();
        threads.get_mut("svSync").unwrap().count = 89;
        let new = Snapshot::new(threads);
        assert!(did_reset(&new, &old));
    }

    #[test]
    fn reset_detected_on_sum_decrease() {
        let old = sample_b();
        let mut threads = sample_b().into_inner();
        threads.get_mut("svMain").unwrap().sum = 2.99;
        assert!(did_reset(&Snapshot::new(threads), &old));
    }

    #[test]
    fn growth_is_not_a_reset() {
        assert!(!did_reset(&sample_b(), &sample_a()));
        assert!(did_reset(&sample_a(), &sample_b()));
    }

    #[test]
    fn baseline_seeds_then_produces_deltas() {
        let mut baseline = Baseline::new();
        assert!(baseline.is_empty());
        assert_eq!(baseline.advance(&sample_a(), 1_000), BaselineStep::Seeded);

        match baseline.advance(&sample_b(), 61_000) {
            BaselineStep::Delta { delta, span_ms } => {
                assert_eq!(span_ms, 60_000);
                assert_eq!(delta.get("svMain").unwrap().count, 60);
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn baseline_reseeds_after_reset() {
        let mut baseline = Baseline::new();
        baseline.advance(&sample_b(), 0);

        // The process restarted: counters are lower than the reference.
        let restarted = sample_a();
        assert_eq!(baseline.advance(&restarted, 60_000), BaselineStep::Reset);
        assert_eq!(baseline.snapshot(), Some(&restarted));
        assert_eq!(baseline.taken_at(), Some(60_000));

        // The next delta is measured from the restarted counters, never
        // negative.
        match baseline.advance(&sample_b(), 120_000) {
            BaselineStep::Delta { delta, .. } => {
                assert_eq!(delta.get("svMain").unwrap().count, 60);
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn zero_anchored_baseline_yields_absolute_snapshot() {
        let mut baseline = Baseline::zero_at(10_000);
        match baseline.advance(&sample_a(), 70_000) {
            BaselineStep::Delta { delta, span_ms } => {
                assert_eq!(span_ms, 60_000);
                assert_eq!(delta.into_inner(), sample_a().into_inner());
            }
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn evaluate_does_not_mutate() {
        let mut baseline = Baseline::new();
        baseline.commit(&sample_a(), 0);
        let before = baseline.clone();
        let _ = baseline.evaluate(&sample_b(), 60_000);
        assert_eq!(baseline, before);
    }

    #[test]
    fn due_after_interval() {
        let mut baseline = Baseline::new();
        assert!(baseline.is_due(0, 300_000));
        baseline.commit(&sample_a(), 1_000);
        assert!(!baseline.is_due(200_000, 300_000));
        assert!(baseline.is_due(301_000, 300_000));
    }
}
