//! Fixed-capacity quantile calculator over a sliding window of samples.

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::{StatsError, StatsResult};

/// The five percentiles rendered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuantileResult {
    /// Fewer samples than the configured minimum.
    NotEnoughData { samples: usize, required: usize },
    Ready(Percentiles),
}

impl QuantileResult {
    pub fn percentiles(&self) -> Option<Percentiles> {
        match self {
            QuantileResult::Ready(p) => Some(*p),
            QuantileResult::NotEnoughData { .. } => None,
        }
    }
}

/// Circular buffer of the most recent `capacity` samples.
#[derive(Debug, Clone)]
pub struct QuantileEstimator {
    samples: VecDeque<f64>,
    capacity: usize,
    min_samples: usize,
}

impl QuantileEstimator {
    /// `min_samples` must be between 1 and `capacity`.
    pub fn new(capacity: usize, min_samples: usize) -> StatsResult<Self> {
        if capacity == 0 {
            return Err(StatsError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if min_samples == 0 || min_samples > capacity {
            return Err(StatsError::InvalidConfig(format!(
                "min_samples must be within 1..={capacity}, got {min_samples}"
            )));
        }
        Ok(Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            min_samples,
        })
    }

    /// Record a sample, evicting the oldest one when full. Non-finite
    /// values are ignored.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn result(&self) -> QuantileResult {
        if self.samples.len() < self.min_samples {
            return QuantileResult::NotEnoughData {
                samples: self.samples.len(),
                required: self.min_samples,
            };
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        QuantileResult::Ready(Percentiles {
            p5: interpolate(&sorted, 0.05),
            p25: interpolate(&sorted, 0.25),
            p50: interpolate(&sorted, 0.50),
            p75: interpolate(&sorted, 0.75),
            p95: interpolate(&sorted, 0.95),
        })
    }
}

/// Linear interpolation between closest ranks of a sorted, non-empty slice.
fn interpolate(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_config() {
        assert!(QuantileEstimator::new(0, 1).is_err());
        assert!(QuantileEstimator::new(10, 0).is_err());
        assert!(QuantileEstimator::new(10, 11).is_err());
    }

    #[test]
    fn not_enough_data_until_minimum() {
        let mut q = QuantileEstimator::new(10, 3).unwrap();
        assert_eq!(
            q.result(),
            QuantileResult::NotEnoughData { samples: 0, required: 3 }
        );

        q.push(1.0);
        q.push(2.0);
        assert!(q.result().percentiles().is_none());

        q.push(3.0);
        let p = q.result().percentiles().unwrap();
        assert_eq!(p.p50, 2.0);
    }

    #[test]
    fn clear_returns_to_not_enough_data() {
        let mut q = QuantileEstimator::new(4, 2).unwrap();
        q.push(1.0);
        q.push(2.0);
        assert!(q.result().percentiles().is_some());

        q.clear();
        assert!(q.is_empty());
        assert!(matches!(q.result(), QuantileResult::NotEnoughData { .. }));
    }

    #[test]
    fn percentiles_of_uniform_range() {
        let mut q = QuantileEstimator::new(101, 1).unwrap();
        for i in 0..=100 {
            q.push(i as f64);
        }
        let p = q.result().percentiles().unwrap();
        assert_eq!(p.p5, 5.0);
        assert_eq!(p.p25, 25.0);
        assert_eq!(p.p50, 50.0);
        assert_eq!(p.p75, 75.0);
        assert_eq!(p.p95, 95.0);
    }

    #[test]
    fn interpolates_between_ranks() {
        let mut q = QuantileEstimator::new(4, 1).unwrap();
        for v in [10.0, 20.0, 30.0, 40.0] {
            q.push(v);
        }
        // rank for p50 is 1.5 → halfway between 20 and 30.
        assert_eq!(q.result().percentiles().unwrap().p50, 25.0);
    }

    #[test]
    fn window_evicts_oldest() {
        let mut q = QuantileEstimator::new(3, 1).unwrap();
        for v in [100.0, 1.0, 2.0, 3.0] {
            q.push(v);
        }
        assert_eq!(q.len(), 3);
        let p = q.result().percentiles().unwrap();
        assert!((p.p95 - 2.9).abs() < 1e-9, "p95 was {}", p.p95);
    }

    #[test]
    fn ignores_non_finite() {
        let mut q = QuantileEstimator::new(3, 1).unwrap();
        q.push(f64::NAN);
        q.push(f64::INFINITY);
        assert!(q.is_empty());
    }
}
