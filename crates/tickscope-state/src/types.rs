//! Perf log domain types.
//!
//! All timestamps are unix epoch milliseconds.

use serde::{Deserialize, Serialize};

use tickscope_core::{Boundaries, Delta};

/// Version of the persisted [`PerfFile`] layout.
pub const PERF_FILE_VERSION: u32 = 1;

/// One entry of the perf log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEntry {
    /// The managed process came up. `duration` is how many seconds it took.
    Boot { ts: u64, duration: u64 },
    /// The managed process went down.
    Close { ts: u64, reason: String },
    Data(DataEntry),
}

impl LogEntry {
    pub fn ts(&self) -> u64 {
        match self {
            LogEntry::Boot { ts, .. } | LogEntry::Close { ts, .. } => *ts,
            LogEntry::Data(d) => d.ts,
        }
    }

    pub fn as_data(&self) -> Option<&DataEntry> {
        match self {
            LogEntry::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, LogEntry::Data(_))
    }

    pub fn is_boot(&self) -> bool {
        matches!(self, LogEntry::Boot { .. })
    }
}

/// Counters and readings covering `[ts - duration, ts]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub ts: u64,
    /// Milliseconds covered by this entry.
    pub duration: u64,
    /// Log entries folded into this one by retention; 1 for a raw sample.
    /// Counters hold the per-sample average, so totals scale by this.
    #[serde(default = "one_sample")]
    pub samples: u32,
    /// Connected players, when the count could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<f64>,
    /// Resident memory of the managed process, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_memory: Option<f64>,
    /// Resident memory of the panel itself, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_memory: Option<f64>,
    /// Tick counters accumulated over the covered span.
    pub perf: Delta,
}

fn one_sample() -> u32 {
    1
}

impl DataEntry {
    pub fn start(&self) -> u64 {
        self.ts.saturating_sub(self.duration)
    }
}

/// The persisted record, replaced wholesale on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfFile {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_boundaries: Option<Boundaries>,
    pub log: Vec<LogEntry>,
}

impl PerfFile {
    pub fn empty() -> Self {
        Self {
            version: PERF_FILE_VERSION,
            last_boundaries: None,
            log: Vec::new(),
        }
    }

    /// Structural checks beyond what deserialization guarantees.
    pub fn validate(&self, bucket_count: usize) -> Result<(), String> {
        if let Some(boundaries) = &self.last_boundaries {
            boundaries
                .validate(bucket_count)
                .map_err(|e| format!("last_boundaries: {e}"))?;
        }

        let mut previous_ts = 0u64;
        for (index, entry) in self.log.iter().enumerate() {
            if entry.ts() < previous_ts {
                return Err(format!("entry {index} is older than the entry before it"));
            }
            previous_ts = entry.ts();

            let Some(data) = entry.as_data() else {
                continue;
            };
            if self.last_boundaries.is_none() {
                return Err(format!("data entry {index} without boundaries"));
            }
            if data.samples == 0 {
                return Err(format!("data entry {index} folds zero samples"));
            }
            if data.players.is_some_and(|p| !p.is_finite() || p < 0.0) {
                return Err(format!("data entry {index} has an invalid player count"));
            }
            for (thread, counters) in data.perf.iter() {
                if counters.buckets.len() != bucket_count {
                    return Err(format!(
                        "data entry {index} thread {thread:?} has {} buckets, expected {bucket_count}",
                        counters.buckets.len()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// One continuous run of the managed process, derived from the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lifespan {
    /// Boot timestamp, or the start of the first data entry when the boot
    /// was not observed.
    pub start: u64,
    /// Close timestamp, or the end of the last data entry when the close
    /// was not observed. `None` while nothing but a boot was seen.
    pub end: Option<u64>,
    pub boot_duration: Option<u64>,
    pub close_reason: Option<String>,
    pub data_points: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickscope_core::{Boundary, ThreadCounters};

    fn boundaries() -> Boundaries {
        Boundaries::try_new(vec![Boundary::Finite(0.01), Boundary::Inf], 2).unwrap()
    }

    fn data(ts: u64, buckets: Vec<u64>) -> LogEntry {
        LogEntry::Data(DataEntry {
            ts,
            duration: 60_000,
            samples: 1,
            players: Some(3.0),
            process_memory: Some(1024.0),
            aux_memory: None,
            perf: [(
                "svMain".to_string(),
                ThreadCounters {
                    count: buckets.iter().sum(),
                    sum: 1.0,
                    buckets,
                },
            )]
            .into_iter()
            .collect(),
        })
    }

    #[test]
    fn log_entry_json_shape() {
        let boot = LogEntry::Boot { ts: 5, duration: 12 };
        assert_eq!(
            serde_json::to_string(&boot).unwrap(),
            r#"{"type":"boot","ts":5,"duration":12}"#
        );

        let entry = data(60_000, vec![1, 2]);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "data");
        assert_eq!(json["perf"]["svMain"]["buckets"][1], 2);
        assert!(json.get("aux_memory").is_none());

        let back: LogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn data_entry_defaults_for_older_records() {
        let json = r#"{"type":"data","ts":60000,"duration":60000,"perf":{}}"#;
        let entry: LogEntry = serde_json::from_str(json).unwrap();
        let data = entry.as_data().unwrap();
        assert_eq!(data.samples, 1);
        assert_eq!(data.players, None);
    }

    #[test]
    fn perf_file_validates() {
        let file = PerfFile {
            version: PERF_FILE_VERSION,
            last_boundaries: Some(boundaries()),
            log: vec![
                LogEntry::Boot { ts: 1, duration: 10 },
                data(60_000, vec![1, 2]),
                LogEntry::Close { ts: 70_000, reason: "stopped".to_string() },
            ],
        };
        assert_eq!(file.validate(2), Ok(()));
    }

    #[test]
    fn perf_file_rejects_wrong_bucket_count() {
        let file = PerfFile {
            version: PERF_FILE_VERSION,
            last_boundaries: Some(boundaries()),
            log: vec![data(60_000, vec![1, 2, 3])],
        };
        assert!(file.validate(2).is_err());
    }

    #[test]
    fn perf_file_rejects_unordered_entries() {
        let file = PerfFile {
            version: PERF_FILE_VERSION,
            last_boundaries: Some(boundaries()),
            log: vec![data(120_000, vec![1, 2]), data(60_000, vec![1, 2])],
        };
        assert!(file.validate(2).is_err());
    }

    #[test]
    fn perf_file_rejects_data_without_boundaries() {
        let file = PerfFile {
            version: PERF_FILE_VERSION,
            last_boundaries: None,
            log: vec![data(60_000, vec![1, 2])],
        };
        assert!(file.validate(2).is_err());
    }
}
