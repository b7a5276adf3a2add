//! Millisecond clocks and timestamp rendering

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Reference point for the monotonic clock, fixed on first use
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Source of monotonic milliseconds
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;
}

/// Wall-independent clock counting from the first time it is read
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        EPOCH.elapsed().as_millis() as u64
    }
}

/// Manually driven clock for deterministic tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_ms`
    pub fn new(start_ms: u64) -> Self {
        Self { now: AtomicU64::new(start_ms) }
    }

    /// Move the clock forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump the clock to `ms`
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Render `[HH:MM:SS.mmm] ` for a millisecond reading; hours wrap at 100
pub fn format_timestamp(ms: u64) -> String {
    let sec = ms / 1000;
    format!(
        "[{:02}:{:02}:{:02}.{:03}] ",
        (sec / 3600) % 100,
        (sec / 60) % 60,
        sec % 60,
        ms % 1000
    )
}
