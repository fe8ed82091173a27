//! tickscope.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickscopeConfig {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Shape of the tick-time histogram exposed by the managed process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Metric family name, e.g. `tickTime` for `tickTime_bucket{...}`.
    pub family: String,
    /// Threads that must be present in every sample.
    pub threads: Vec<String>,
    /// Thread whose bucket lines define the boundaries.
    pub reference_thread: String,
    /// Number of buckets per thread, `+Inf` included.
    pub bucket_count: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            family: "tickTime".to_string(),
            threads: vec![
                "svSync".to_string(),
                "svNetwork".to_string(),
                "svMain".to_string(),
            ],
            reference_thread: "svMain".to_string(),
            bucket_count: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds between two samples.
    pub tick_interval_secs: u64,
    /// Minimum seconds between two persisted data entries.
    pub save_interval_secs: u64,
    /// Samples where any thread ticked fewer times than this are discarded.
    pub min_ticks: u64,
    /// Fetch latency samples kept for the recent-stats view.
    pub latency_window: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            save_interval_secs: 300,
            min_ticks: 600,
            latency_window: 60,
        }
    }
}

impl CollectorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

/// How coarse history becomes as it ages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionTier {
    pub max_age_secs: u64,
    pub resolution_secs: u64,
}

impl RetentionTier {
    pub const fn new(max_age_secs: u64, resolution_secs: u64) -> Self {
        Self {
            max_age_secs,
            resolution_secs,
        }
    }

    pub fn max_age_ms(&self) -> u64 {
        self.max_age_secs.saturating_mul(1000)
    }

    pub fn resolution_ms(&self) -> u64 {
        self.resolution_secs.saturating_mul(1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Hard cap on the number of log entries.
    pub max_entries: usize,
    /// Tiers ordered by ascending max age.
    pub tiers: Vec<RetentionTier>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        const HOUR: u64 = 60 * 60;
        Self {
            max_entries: 720,
            tiers: vec![
                RetentionTier::new(12 * HOUR, 5 * 60),
                RetentionTier::new(24 * HOUR, 15 * 60),
                RetentionTier::new(96 * HOUR, 30 * 60),
            ],
        }
    }
}

/// Where the managed process exposes its counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// `host:port` of the managed process's HTTP endpoint.
    pub address: String,
    pub metrics_path: String,
    pub players_path: String,
    pub timeout_ms: u64,
    /// File holding the managed process's PID, for memory readings.
    pub pid_file: Option<PathBuf>,
    /// Seconds between two process state polls.
    pub poll_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:30120".to_string(),
            metrics_path: "/perf/".to_string(),
            players_path: "/players.json".to_string(),
            timeout_ms: 5000,
            pid_file: None,
            poll_interval_secs: 5,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File name of the perf database, relative to the data directory.
    pub file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_name: "perf.redb".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn path_in(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.file_name)
    }
}

impl TickscopeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TickscopeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the collector cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parser.bucket_count < 2 {
            return Err(ConfigError::BucketCount);
        }
        if self.parser.threads.is_empty() {
            return Err(ConfigError::NoThreads);
        }
        if !self.parser.threads.contains(&self.parser.reference_thread) {
            return Err(ConfigError::UnknownReferenceThread(
                self.parser.reference_thread.clone(),
            ));
        }
        if self.collector.tick_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("tick_interval_secs"));
        }
        if self.collector.save_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("save_interval_secs"));
        }
        if self.collector.latency_window == 0 {
            return Err(ConfigError::ZeroLatencyWindow);
        }
        if self.retention.max_entries == 0 {
            return Err(ConfigError::ZeroMaxEntries);
        }
        if self.retention.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }
        for (index, tier) in self.retention.tiers.iter().enumerate() {
            if tier.resolution_secs == 0 {
                return Err(ConfigError::ZeroResolution { index });
            }
            if index > 0 && tier.max_age_secs <= self.retention.tiers[index - 1].max_age_secs {
                return Err(ConfigError::UnorderedTiers { index });
            }
        }
        Ok(())
    }
}
