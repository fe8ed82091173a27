//! Category counter: label → non-negative count.
//!
//! Used to build frequency tables (bucket distributions, close reasons)
//! that render identically on every refresh: all views are sorted.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::{StatsError, StatsResult};

/// Direction of a sorted view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Counts occurrences per label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counter {
    counts: BTreeMap<String, u64>,
    #[serde(skip)]
    read_only: bool,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a counter from pairs and lock it against any later mutation.
    pub fn read_only<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        let mut counter = Self::new();
        for (label, amount) in pairs {
            counter.add(label.into(), amount);
        }
        counter.read_only = true;
        counter
    }

    /// Lock this counter. Every later mutation returns [`StatsError::ReadOnly`].
    pub fn freeze(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Increment `label` by `amount`.
    pub fn count(&mut self, label: &str, amount: u64) -> StatsResult<()> {
        self.ensure_writable()?;
        self.add(label.to_string(), amount);
        Ok(())
    }

    /// Add every count of `other` into this counter.
    pub fn merge_counter(&mut self, other: &Counter) -> StatsResult<()> {
        self.ensure_writable()?;
        for (label, amount) in &other.counts {
            self.add(label.clone(), *amount);
        }
        Ok(())
    }

    /// Add a list of `(label, amount)` pairs.
    pub fn merge_pairs<I, K>(&mut self, pairs: I) -> StatsResult<()>
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        self.ensure_writable()?;
        for (label, amount) in pairs {
            self.add(label.into(), amount);
        }
        Ok(())
    }

    /// Add a plain label → amount record.
    pub fn merge_map(&mut self, record: &HashMap<String, u64>) -> StatsResult<()> {
        self.ensure_writable()?;
        for (label, amount) in record {
            self.add(label.clone(), *amount);
        }
        Ok(())
    }

    /// Count for `label`, zero if never seen.
    pub fn get(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries ordered by label.
    pub fn sorted_by_key(&self, order: SortOrder) -> Vec<(&str, u64)> {
        let mut out: Vec<(&str, u64)> =
            self.counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        if order == SortOrder::Descending {
            out.reverse();
        }
        out
    }

    /// Entries ordered by count. Equal counts keep label order so the view
    /// is stable between calls.
    pub fn sorted_by_value(&self, order: SortOrder) -> Vec<(&str, u64)> {
        let mut out: Vec<(&str, u64)> =
            self.counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        out.sort_by(|a, b| {
            let by_value = match order {
                SortOrder::Ascending => a.1.cmp(&b.1),
                SortOrder::Descending => b.1.cmp(&a.1),
            };
            match by_value {
                Ordering::Equal => a.0.cmp(b.0),
                other => other,
            }
        });
        out
    }

    fn ensure_writable(&self) -> StatsResult<()> {
        if self.read_only {
            Err(StatsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn add(&mut self, label: String, amount: u64) {
        let slot = self.counts.entry(label).or_insert(0);
        *slot = slot.saturating_add(amount);
    }
}
