//! Seams to the managed process: where counters and memory readings come
//! from. The collector only sees these traits, so tests substitute fakes.

use std::future::Future;
use std::pin::Pin;

use crate::error::FetchResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the raw metrics text of the managed process.
pub trait MetricsSource: Send + Sync {
    fn fetch_metrics(&self) -> BoxFuture<'_, FetchResult<String>>;
}

/// Which process a memory reading is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRef {
    Pid(u32),
    /// The process running the collector.
    Current,
}

/// Reads resident memory, in bytes.
pub trait MemorySource: Send + Sync {
    fn resident_bytes(&self, process: ProcessRef) -> BoxFuture<'_, FetchResult<u64>>;
}
