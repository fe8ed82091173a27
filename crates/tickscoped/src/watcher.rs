//! Lifecycle watcher: turns health transitions of the managed process
//! into boot and close markers on the collector.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use tickscope_collector::{epoch_ms, Collector, ProcessHealth, ProcessMonitor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Boot { ts: u64, duration_secs: u64 },
    Close { ts: u64, reason: &'static str },
}

/// Tracks whether the managed process is up across polls.
#[derive(Debug, Default)]
pub struct LifecycleTracker {
    /// `None` until the first observation. A process already running when
    /// the daemon starts is not a boot.
    up: Option<bool>,
    starting_since: Option<u64>,
}

impl LifecycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, health: ProcessHealth, now: u64) -> Option<LifecycleEvent> {
        let connectable = health.is_connectable();
        let was_up = self.up.replace(connectable);

        match (was_up, connectable) {
            (Some(false), true) => {
                let since = self.starting_since.take().unwrap_or(now);
                Some(LifecycleEvent::Boot {
                    ts: now,
                    duration_secs: now.saturating_sub(since) / 1000,
                })
            }
            (Some(true), false) => {
                self.starting_since = (health == ProcessHealth::Starting).then_some(now);
                let reason = match health {
                    ProcessHealth::Starting => "restarted",
                    _ => "offline",
                };
                Some(LifecycleEvent::Close { ts: now, reason })
            }
            (_, false) => {
                if health == ProcessHealth::Starting {
                    self.starting_since.get_or_insert(now);
                } else {
                    self.starting_since = None;
                }
                None
            }
            (_, true) => None,
        }
    }
}

/// Poll `monitor` every `poll_interval` and forward transitions to the
/// collector until shutdown.
pub async fn run(
    collector: Arc<Collector>,
    monitor: Arc<dyn ProcessMonitor>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(poll_secs = poll_interval.as_secs(), "lifecycle watcher started");
    let mut tracker = LifecycleTracker::new();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {
                let health = monitor.health().await;
                match tracker.observe(health, epoch_ms()) {
                    Some(LifecycleEvent::Boot { ts, duration_secs }) => {
                        collector.on_boot(ts, duration_secs).await;
                    }
                    Some(LifecycleEvent::Close { ts, reason }) => {
                        collector.on_close(ts, reason).await;
                    }
                    None => debug!(?health, "managed process polled"),
                }
            }
            _ = shutdown.changed() => {
                info!("lifecycle watcher shutting down");
                break;
            }
        }
    }
}
