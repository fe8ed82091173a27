//! Resident memory readings from procfs.

use std::path::PathBuf;

use crate::error::{FetchError, FetchResult};
use crate::source::{BoxFuture, MemorySource, ProcessRef};

/// Reads `statm` under a procfs mount and converts resident pages to bytes.
#[derive(Debug, Clone)]
pub struct ProcMemorySource {
    proc_root: PathBuf,
    page_size: u64,
}

impl ProcMemorySource {
    pub fn new() -> Self {
        Self::with_root("/proc", system_page_size())
    }

    /// Read from another procfs root (for testing).
    pub fn with_root(proc_root: impl Into<PathBuf>, page_size: u64) -> Self {
        Self {
            proc_root: proc_root.into(),
            page_size,
        }
    }

    fn statm_path(&self, process: ProcessRef) -> PathBuf {
        match process {
            ProcessRef::Pid(pid) => self.proc_root.join(pid.to_string()).join("statm"),
            ProcessRef::Current => self.proc_root.join("self").join("statm"),
        }
    }

    async fn read(&self, process: ProcessRef) -> FetchResult<u64> {
        let path = self.statm_path(process);
        let content = tokio::fs::read_to_string(&path).await?;
        let resident_pages = parse_statm_resident(&content).ok_or_else(|| {
            FetchError::MemoryUnavailable(format!("unexpected statm format in {}", path.display()))
        })?;
        Ok(resident_pages.saturating_mul(self.page_size))
    }
}

impl Default for ProcMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for ProcMemorySource {
    fn resident_bytes(&self, process: ProcessRef) -> BoxFuture<'_, FetchResult<u64>> {
        Box::pin(self.read(process))
    }
}

/// Second field of `statm`: resident set size in pages.
fn parse_statm_resident(content: &str) -> Option<u64> {
    content.split_whitespace().nth(1)?.parse().ok()
}

fn system_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}
