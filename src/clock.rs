//! Monotonic millisecond clock.
//!
//! All presence and cooldown arithmetic is done in milliseconds since the
//! clock's origin. `SystemClock` is backed by `tokio::time::Instant` so that
//! paused test time drives it the same way it drives the tickers.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since the clock's origin. Never decreases.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock moved by hand, for deterministic tests of the evaluator and sampler.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, ms: u64) {
        self.now.fetch_max(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
