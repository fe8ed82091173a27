//! The managed process as the collector sees it: is it up, how many
//! players, which pid.

use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use tickscope_metrics::{BoxFuture, FetchError, HttpFetcher};

/// Reachability of the managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessHealth {
    /// Nothing is listening.
    Offline,
    /// Listening, but not serving yet.
    Starting,
    /// Serving, but slow to answer.
    Partial,
    Online,
}

impl ProcessHealth {
    /// Whether a metrics fetch is worth attempting.
    pub fn is_connectable(self) -> bool {
        matches!(self, ProcessHealth::Partial | ProcessHealth::Online)
    }
}

/// Status collaborator for the managed process.
pub trait ProcessMonitor: Send + Sync {
    fn health(&self) -> BoxFuture<'_, ProcessHealth>;

    /// Connected players, if the process reports them.
    fn player_count(&self) -> BoxFuture<'_, Option<u32>>;

    /// Pid of the managed process, if known.
    fn pid(&self) -> BoxFuture<'_, Option<u32>>;
}

/// Monitor that polls the process's player list endpoint and reads its pid
/// from a pid file.
#[derive(Debug, Clone)]
pub struct HttpProcessMonitor {
    fetcher: HttpFetcher,
    players_path: String,
    pid_file: Option<PathBuf>,
}

impl HttpProcessMonitor {
    pub fn new(fetcher: HttpFetcher, players_path: impl Into<String>, pid_file: Option<PathBuf>) -> Self {
        Self {
            fetcher,
            players_path: players_path.into(),
            pid_file,
        }
    }

    async fn probe(&self) -> ProcessHealth {
        match self.fetcher.get_text(&self.players_path).await {
            Ok(_) => ProcessHealth::Online,
            Err(FetchError::Status(_)) => ProcessHealth::Starting,
            Err(FetchError::Timeout(_)) => ProcessHealth::Partial,
            Err(e) => {
                debug!(address = %self.fetcher.address(), error = %e, "process unreachable");
                ProcessHealth::Offline
            }
        }
    }

    async fn players(&self) -> Option<u32> {
        let body = self.fetcher.get_text(&self.players_path).await.ok()?;
        count_players(&body)
    }

    async fn read_pid(&self) -> Option<u32> {
        let path = self.pid_file.as_ref()?;
        let content = tokio::fs::read_to_string(path).await.ok()?;
        content.trim().parse().ok()
    }
}

impl ProcessMonitor for HttpProcessMonitor {
    fn health(&self) -> BoxFuture<'_, ProcessHealth> {
        Box::pin(self.probe())
    }

    fn player_count(&self) -> BoxFuture<'_, Option<u32>> {
        Box::pin(self.players())
    }

    fn pid(&self) -> BoxFuture<'_, Option<u32>> {
        Box::pin(self.read_pid())
    }
}

/// The players endpoint serves a JSON array with one element per player.
fn count_players(body: &str) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let players = value.as_array()?;
    u32::try_from(players.len()).ok()
}
