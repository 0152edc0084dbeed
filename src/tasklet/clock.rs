//! Millisecond clocks and wraparound-safe time arithmetic.
//!
//! Time is a 32-bit millisecond counter that wraps. A target lies in the
//! future when the wrapped distance to it is below [`HORIZON_MS`]; anything
//! else counts as already past.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Largest delay that can be scheduled, half the counter range.
pub const HORIZON_MS: u32 = 0x8000_0000;

/// Milliseconds from `now` until `target`, or 0 if `target` is already past.
///
/// ```
/// use ca821x_link::tasklet::time_until;
///
/// assert_eq!(time_until(100, 150), 50);
/// assert_eq!(time_until(150, 100), 0);
/// assert_eq!(time_until(u32::MAX - 4, 5), 10);
/// ```
#[inline]
pub fn time_until(now: u32, target: u32) -> u32 {
    let delta = target.wrapping_sub(now);
    if delta >= HORIZON_MS {
        0
    } else {
        delta
    }
}

/// True if `target` is now or in the past relative to `now`.
#[inline]
pub fn is_due(now: u32, target: u32) -> bool {
    time_until(now, target) == 0
}

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds. Wraps at `u32::MAX`.
    fn now_ms(&self) -> u32;

    /// Give up control while waiting.
    ///
    /// `max_ms` bounds how long it is safe to idle before the next tasklet
    /// is due; `None` means nothing is scheduled.
    fn idle(&self, max_ms: Option<u32>) {
        let _ = max_ms;
        std::thread::yield_now();
    }
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock measured from its creation.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start a clock at 0.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Convenience for `Arc::new(SystemClock::new())`.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation gives the wrapping counter
        self.origin.elapsed().as_millis() as u32
    }

    fn idle(&self, max_ms: Option<u32>) {
        match max_ms {
            Some(0) => std::thread::yield_now(),
            _ => std::thread::sleep(Duration::from_millis(1)),
        }
    }
}

/// Hand-driven clock for simulation and tests.
///
/// Idling advances time, so a blocking wait on a `ManualClock` runs through
/// its timeout without real delay.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start)),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: u32) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move time forward, wrapping at `u32::MAX`.
    pub fn advance(&self, ms: u32) {
        let now = self.now.load(Ordering::SeqCst);
        self.now.store(now.wrapping_add(ms), Ordering::SeqCst);
    }

    /// Shared handle backed by the same counter.
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }

    fn idle(&self, max_ms: Option<u32>) {
        self.advance(max_ms.unwrap_or(1).max(1));
    }
}
