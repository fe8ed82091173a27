//! Shared types used across tickscope crates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BoundariesError;

/// Upper bound of a histogram bucket (the `le` label).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boundary {
    Finite(f64),
    /// The `+Inf` sentinel closing every histogram.
    Inf,
}

impl Boundary {
    /// Parse an `le` label value. Returns `None` for anything that is not a
    /// finite number or `+Inf`.
    pub fn parse(s: &str) -> Option<Self> {
        if s == "+Inf" {
            return Some(Boundary::Inf);
        }
        let value: f64 = s.parse().ok()?;
        value.is_finite().then_some(Boundary::Finite(value))
    }

    pub fn is_inf(&self) -> bool {
        matches!(self, Boundary::Inf)
    }

    /// Label used for chart axes and frequency tables.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Finite(v) => write!(f, "{v}"),
            Boundary::Inf => f.write_str("+Inf"),
        }
    }
}

impl Serialize for Boundary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Boundary::Finite(v) => serializer.serialize_f64(*v),
            Boundary::Inf => serializer.serialize_str("+Inf"),
        }
    }
}

impl<'de> Deserialize<'de> for Boundary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(v) if v.is_finite() => Ok(Boundary::Finite(v)),
            Repr::Number(v) => Err(serde::de::Error::custom(format!(
                "non-finite bucket boundary {v}"
            ))),
            Repr::Text(s) if s == "+Inf" => Ok(Boundary::Inf),
            Repr::Text(s) => Err(serde::de::Error::custom(format!(
                "invalid bucket boundary {s:?}"
            ))),
        }
    }
}

/// Ordered histogram bucket boundaries, closed by `+Inf`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Boundaries(Vec<Boundary>);

impl Boundaries {
    /// Validate and wrap a boundary list of exactly `expected` entries.
    pub fn try_new(values: Vec<Boundary>, expected: usize) -> Result<Self, BoundariesError> {
        let boundaries = Self(values);
        boundaries.validate(expected)?;
        Ok(boundaries)
    }

    /// Check the length, the trailing sentinel, and strict ordering.
    pub fn validate(&self, expected: usize) -> Result<(), BoundariesError> {
        let values = &self.0;
        if values.len() != expected {
            return Err(BoundariesError::WrongCount {
                expected,
                found: values.len(),
            });
        }
        match values.last() {
            Some(Boundary::Inf) => {}
            _ => return Err(BoundariesError::MissingSentinel),
        }

        let mut previous: Option<f64> = None;
        for (index, boundary) in values[..values.len() - 1].iter().enumerate() {
            let value = match boundary {
                Boundary::Finite(v) => *v,
                Boundary::Inf => return Err(BoundariesError::NotFinite { index }),
            };
            if previous.is_some_and(|p| value <= p) {
                return Err(BoundariesError::NotIncreasing { index });
            }
            previous = Some(value);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Boundary> {
        self.0.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Boundary> {
        self.0.iter()
    }
}

/// Tick-time counters of one thread, with per-bucket (not cumulative)
/// bucket counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreadCounters {
    /// Number of ticks observed.
    pub count: u64,
    /// Total tick time in seconds.
    pub sum: f64,
    /// Ticks per bucket, aligned with the boundaries.
    pub buckets: Vec<u64>,
}

impl ThreadCounters {
    /// Average tick duration in seconds, if any tick was observed.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Absolute counters for every monitored thread, as read from one sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, ThreadCounters>);

/// Change of every thread's counters since a reference snapshot.
///
/// Kept apart from [`Snapshot`] so absolute and relative values can never
/// be mixed up.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(BTreeMap<String, ThreadCounters>);

macro_rules! thread_map_api {
    ($ty:ident) => {
        impl $ty {
            pub fn new(threads: BTreeMap<String, ThreadCounters>) -> Self {
                Self(threads)
            }

            pub fn get(&self, thread: &str) -> Option<&ThreadCounters> {
                self.0.get(thread)
            }

            pub fn iter(&self) -> impl Iterator<Item = (&String, &ThreadCounters)> {
                self.0.iter()
            }

            pub fn threads(&self) -> impl Iterator<Item = &str> {
                self.0.keys().map(String::as_str)
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Smallest tick count across all threads.
            pub fn min_count(&self) -> Option<u64> {
                self.0.values().map(|t| t.count).min()
            }

            pub fn into_inner(self) -> BTreeMap<String, ThreadCounters> {
                self.0
            }
        }

        impl FromIterator<(String, ThreadCounters)> for $ty {
            fn from_iter<I: IntoIterator<Item = (String, ThreadCounters)>>(iter: I) -> Self {
                Self(iter.into_iter().collect())
            }
        }
    };
}

thread_map_api!(Snapshot);
thread_map_api!(Delta);
