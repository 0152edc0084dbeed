//! Tasklet module - deferred callbacks on a wrapping millisecond clock.
//!
//! This module provides:
//! - `Clock` abstraction with a wall clock and a hand-driven clock
//! - Wraparound-safe time helpers
//! - `Scheduler`: a fixed-capacity, time-ordered tasklet queue

mod clock;
mod scheduler;

pub use clock::{is_due, time_until, Clock, ManualClock, SharedClock, SystemClock, HORIZON_MS};
pub use scheduler::{Scheduler, TaskletFn, TaskletId};
