//! Monotonic stopwatch.
//!
//! `stop` is idempotent: the first call freezes the reading and every later
//! call returns that same reading.

use std::time::{Duration, Instant};

use serde::Serialize;

/// An elapsed duration expressed in three units at once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Elapsed {
    pub nanos: u128,
    pub millis: f64,
    pub secs: f64,
}

impl From<Duration> for Elapsed {
    fn from(d: Duration) -> Self {
        Self {
            nanos: d.as_nanos(),
            millis: d.as_secs_f64() * 1000.0,
            secs: d.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stopwatch {
    started: Instant,
    stopped: Option<Elapsed>,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            stopped: None,
        }
    }

    /// Time since start, without stopping.
    pub fn elapsed(&self) -> Elapsed {
        self.stopped
            .unwrap_or_else(|| Elapsed::from(self.started.elapsed()))
    }

    pub fn stop(&mut self) -> Elapsed {
        let started = self.started;
        *self
            .stopped
            .get_or_insert_with(|| Elapsed::from(started.elapsed()))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_agree() {
        let e = Elapsed::from(Duration::from_millis(1500));
        assert_eq!(e.nanos, 1_500_000_000);
        assert_eq!(e.millis, 1500.0);
        assert_eq!(e.secs, 1.5);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut sw = Stopwatch::start();
        std::thread::sleep(Duration::from_millis(2));
        let first = sw.stop();
        std::thread::sleep(Duration::from_millis(2));
        let second = sw.stop();

        assert!(sw.is_stopped());
        assert_eq!(first, second);
        assert_eq!(sw.elapsed(), first);
        assert!(first.nanos >= 2_000_000);
    }

    #[test]
    fn elapsed_grows_while_running() {
        let sw = Stopwatch::start();
        let a = sw.elapsed();
        std::thread::sleep(Duration::from_millis(1));
        let b = sw.elapsed();
        assert!(b.nanos > a.nanos);
        assert!(!sw.is_stopped());
    }
}
