//! Offline reports over the stored perf log, printed as JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use tickscope_collector::epoch_ms;
use tickscope_core::TickscopeConfig;
use tickscope_state::summary;
use tickscope_state::{PerfFile, PerfStore, RetentionPolicy, TimeSeriesLog};

#[derive(Debug, Clone, clap::Subcommand)]
pub enum ReportView {
    /// Latest data entry.
    Recent,
    /// Series of one thread with boot/close markers.
    Chart {
        /// Thread to chart (defaults to the reference thread).
        #[arg(long)]
        thread: Option<String>,
    },
    /// Aggregates over the last hours.
    Summary {
        #[arg(long, default_value = "24")]
        hours: u64,

        #[arg(long)]
        thread: Option<String>,
    },
    /// Runs of the managed process.
    Lifespans,
}

pub fn run(config: &TickscopeConfig, db_path: &Path, view: &ReportView) -> anyhow::Result<()> {
    let store = PerfStore::open(db_path)
        .with_context(|| format!("open {} (is the daemon running?)", db_path.display()))?;
    let file = store.load()?.unwrap_or_else(PerfFile::empty);
    let json = render(config, file, view, epoch_ms())?;
    println!("{json}");
    Ok(())
}

fn render(config: &TickscopeConfig, file: PerfFile, view: &ReportView, now: u64) -> anyhow::Result<String> {
    let boundaries = file.last_boundaries;
    let log = TimeSeriesLog::from_entries(file.log, RetentionPolicy::from(&config.retention));
    let reference = config.parser.reference_thread.as_str();

    match view {
        ReportView::Recent => to_json(&log.last_data()),
        ReportView::Chart { thread } => to_json(&summary::chart_data(
            &log,
            boundaries.as_ref(),
            thread.as_deref().unwrap_or(reference),
        )),
        ReportView::Summary { hours, thread } => to_json(&summary::summarize(
            &log,
            boundaries.as_ref(),
            thread.as_deref().unwrap_or(reference),
            Duration::from_secs(hours * 3600).as_millis() as u64,
            now,
        )),
        ReportView::Lifespans => to_json(&log.lifespans()),
    }
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickscope_core::{Boundaries, Boundary, ThreadCounters};
    use tickscope_state::{DataEntry, LogEntry, PERF_FILE_VERSION};

    const MIN: u64 = 60_000;

    fn file() -> PerfFile {
        PerfFile {
            version: PERF_FILE_VERSION,
            last_boundaries: Some(
                Boundaries::try_new(vec![Boundary::Finite(0.05), Boundary::Inf], 2).unwrap(),
            ),
            log: vec![
                LogEntry::Boot { ts: 1_000, duration: 12 },
                LogEntry::Data(DataEntry {
                    ts: 5 * MIN,
                    duration: 5 * MIN,
                    samples: 1,
                    players: Some(3.0),
                    process_memory: None,
                    aux_memory: None,
                    perf: [(
                        "svMain".to_string(),
                        ThreadCounters { count: 3000, sum: 12.0, buckets: vec![2990, 10] },
                    )]
                    .into_iter()
                    .collect(),
                }),
            ],
        }
    }

    #[test]
    fn renders_every_view() {
        let config = TickscopeConfig::default();

        let recent: serde_json::Value =
            serde_json::from_str(&render(&config, file(), &ReportView::Recent, 5 * MIN).unwrap()).unwrap();
        assert_eq!(recent["players"], 3.0);

        let chart: serde_json::Value = serde_json::from_str(
            &render(&config, file(), &ReportView::Chart { thread: None }, 5 * MIN).unwrap(),
        )
        .unwrap();
        assert_eq!(chart["thread"], "svMain");
        assert_eq!(chart["series"].as_array().unwrap().len(), 1);

        let summary: serde_json::Value = serde_json::from_str(
            &render(&config, file(), &ReportView::Summary { hours: 1, thread: None }, 5 * MIN).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["total_ticks"], 3000);
        assert_eq!(summary["restarts"], 1);

        let spans: serde_json::Value =
            serde_json::from_str(&render(&config, file(), &ReportView::Lifespans, 5 * MIN).unwrap()).unwrap();
        assert_eq!(spans[0]["boot_duration"], 12);
    }

    #[test]
    fn report_reads_saved_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.redb");
        PerfStore::open(&path).unwrap().save(&file()).unwrap();

        run(&TickscopeConfig::default(), &path, &ReportView::Lifespans).unwrap();
    }
}
