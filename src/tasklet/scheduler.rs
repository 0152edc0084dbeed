//! Time-ordered tasklet queue.
//!
//! Tasklets live in a fixed table of `N` slots allocated at construction.
//! The queue is a singly linked list threaded through the slots by index,
//! kept sorted by fire time. Equal fire times keep insertion order.
//!
//! # Example
//!
//! ```
//! use ca821x_link::tasklet::{ManualClock, Scheduler, TaskletId};
//! use ca821x_link::Result;
//!
//! fn hello(_: &mut Scheduler<&'static str>, _: TaskletId, name: &'static str) -> Result<()> {
//!     println!("hello {}", name);
//!     Ok(())
//! }
//!
//! let clock = ManualClock::new(0);
//! let mut scheduler: Scheduler<&'static str> = Scheduler::new(clock.shared());
//!
//! let id = scheduler.init(hello).unwrap();
//! scheduler.schedule_delta(id, 10, "radio").unwrap();
//!
//! clock.advance(10);
//! assert_eq!(scheduler.process().unwrap(), 1);
//! ```

use super::clock::{is_due, time_until, SharedClock};
use crate::error::{LinkError, Result};

/// Handle to a tasklet slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskletId(u8);

impl TaskletId {
    /// Slot index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Tasklet callback.
///
/// Receives the scheduler so it can reschedule itself or others, its own id,
/// and the context it was scheduled with.
pub type TaskletFn<T, const N: usize> = fn(&mut Scheduler<T, N>, TaskletId, T) -> Result<()>;

struct Slot<T, const N: usize> {
    callback: Option<TaskletFn<T, N>>,
    context: Option<T>,
    fire_time: u32,
    scheduled: bool,
    next: Option<u8>,
}

impl<T, const N: usize> Slot<T, N> {
    fn vacant() -> Self {
        Self {
            callback: None,
            context: None,
            fire_time: 0,
            scheduled: false,
            next: None,
        }
    }
}

/// Cooperative scheduler for deferred callbacks.
///
/// `T` is the context handed to a callback when it fires. `N` is the number
/// of tasklet slots.
pub struct Scheduler<T = (), const N: usize = 16> {
    slots: [Slot<T, N>; N],
    head: Option<u8>,
    queued: usize,
    clock: SharedClock,
}

impl<T, const N: usize> Scheduler<T, N> {
    const CAPACITY_OK: () = assert!(N > 0 && N <= u8::MAX as usize, "slot count must fit in u8");

    /// Create an empty scheduler reading time from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_OK;

        Self {
            slots: std::array::from_fn(|_| Slot::vacant()),
            head: None,
            queued: 0,
            clock,
        }
    }

    /// Claim a free slot for `callback`.
    pub fn init(&mut self, callback: TaskletFn<T, N>) -> Result<TaskletId> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.callback.is_none())
            .ok_or(LinkError::NoCapacity)?;

        let slot = &mut self.slots[index];
        slot.callback = Some(callback);
        slot.context = None;
        slot.fire_time = 0;
        slot.scheduled = false;
        slot.next = None;

        Ok(TaskletId(index as u8))
    }

    /// Reset an existing tasklet with a new callback.
    ///
    /// The tasklet must not be scheduled.
    pub fn reinit(&mut self, id: TaskletId, callback: TaskletFn<T, N>) -> Result<()> {
        self.check(id)?;
        debug_assert!(
            !self.slots[id.index()].scheduled,
            "reinit of a scheduled tasklet"
        );
        if self.slots[id.index()].scheduled {
            self.unlink(id.0);
        }

        let slot = &mut self.slots[id.index()];
        slot.callback = Some(callback);
        slot.context = None;
        slot.fire_time = 0;
        Ok(())
    }

    /// Return an unscheduled tasklet's slot to the free pool.
    pub fn release(&mut self, id: TaskletId) -> Result<()> {
        self.check(id)?;
        if self.slots[id.index()].scheduled {
            return Err(LinkError::InvalidState(format!(
                "tasklet {} is scheduled",
                id.0
            )));
        }
        self.slots[id.index()] = Slot::vacant();
        Ok(())
    }

    /// Schedule `id` to fire `delta_ms` from now.
    pub fn schedule_delta(&mut self, id: TaskletId, delta_ms: u32, context: T) -> Result<()> {
        let now = self.clock.now_ms();
        self.schedule_abs(id, now, now.wrapping_add(delta_ms), context)
    }

    /// Schedule `id` to fire at `abs_ms`, with `now_ms` as the reference time.
    ///
    /// Fails with `Already` if the tasklet is queued, and with `InvalidArgs`
    /// if `abs_ms` is in the past or beyond the horizon.
    pub fn schedule_abs(&mut self, id: TaskletId, now_ms: u32, abs_ms: u32, context: T) -> Result<()> {
        self.insert(id, now_ms, abs_ms, Some(context))
    }

    /// Schedule without a context. Firing only unlinks the tasklet.
    pub(crate) fn arm(&mut self, id: TaskletId, delta_ms: u32) -> Result<()> {
        let now = self.clock.now_ms();
        self.insert(id, now, now.wrapping_add(delta_ms), None)
    }

    /// Remove `id` from the queue, dropping its context.
    pub fn cancel(&mut self, id: TaskletId) -> Result<()> {
        self.check(id)?;
        if !self.slots[id.index()].scheduled {
            return Err(LinkError::Already);
        }
        self.unlink(id.0);
        self.slots[id.index()].context = None;
        Ok(())
    }

    /// True if `id` is in the queue.
    pub fn is_scheduled(&self, id: TaskletId) -> bool {
        self.slots
            .get(id.index())
            .map(|slot| slot.scheduled)
            .unwrap_or(false)
    }

    /// Fire time of a queued tasklet.
    pub fn scheduled_time(&self, id: TaskletId) -> Result<u32> {
        self.check(id)?;
        let slot = &self.slots[id.index()];
        if !slot.scheduled {
            return Err(LinkError::InvalidState(format!(
                "tasklet {} is not scheduled",
                id.0
            )));
        }
        Ok(slot.fire_time)
    }

    /// Milliseconds until the head of the queue is due, 0 if already due.
    ///
    /// Fails with `NotFound` when the queue is empty.
    pub fn time_to_next(&self) -> Result<u32> {
        let head = self.head.ok_or(LinkError::NotFound)?;
        Ok(time_until(self.clock.now_ms(), self.slots[head as usize].fire_time))
    }

    /// Fire every due tasklet in fire-time order.
    ///
    /// Each tasklet is unlinked before its callback runs, so the callback may
    /// reschedule it. A callback that reschedules itself already due fires
    /// again within the same call. Callback errors are logged.
    ///
    /// Returns the number fired, or `NotFound` if none were due.
    pub fn process(&mut self) -> Result<usize> {
        let mut fired = 0;

        while let Some(head) = self.head {
            let now = self.clock.now_ms();
            if !is_due(now, self.slots[head as usize].fire_time) {
                break;
            }

            self.unlink(head);
            fired += 1;

            let slot = &mut self.slots[head as usize];
            let id = TaskletId(head);
            let (callback, context) = match (slot.callback, slot.context.take()) {
                (Some(callback), Some(context)) => (callback, context),
                _ => continue,
            };

            tracing::trace!("Firing tasklet {}", head);
            if let Err(e) = callback(self, id, context) {
                tracing::error!("Tasklet {} failed: {}", head, e);
            }
        }

        if fired == 0 {
            Err(LinkError::NotFound)
        } else {
            Ok(fired)
        }
    }

    /// Number of queued tasklets.
    pub fn len(&self) -> usize {
        self.queued
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        N
    }

    /// Clock this scheduler reads.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Current time from the clock.
    pub fn now(&self) -> u32 {
        self.clock.now_ms()
    }

    fn check(&self, id: TaskletId) -> Result<()> {
        match self.slots.get(id.index()) {
            Some(slot) if slot.callback.is_some() => Ok(()),
            _ => Err(LinkError::InvalidState(format!(
                "tasklet {} is not initialised",
                id.0
            ))),
        }
    }

    fn insert(&mut self, id: TaskletId, now_ms: u32, abs_ms: u32, context: Option<T>) -> Result<()> {
        self.check(id)?;
        if self.slots[id.index()].scheduled {
            return Err(LinkError::Already);
        }

        let delay = time_until(now_ms, abs_ms);
        if delay == 0 && now_ms != abs_ms {
            return Err(LinkError::InvalidArgs(format!(
                "fire time {} is in the past or beyond the horizon (now {})",
                abs_ms, now_ms
            )));
        }

        // Walk past every entry due no later than the new one
        let mut prev: Option<u8> = None;
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let slot = &self.slots[index as usize];
            if time_until(now_ms, slot.fire_time) > delay {
                break;
            }
            prev = Some(index);
            cursor = slot.next;
        }

        let slot = &mut self.slots[id.index()];
        slot.context = context;
        slot.fire_time = abs_ms;
        slot.scheduled = true;
        slot.next = cursor;

        match prev {
            Some(p) => self.slots[p as usize].next = Some(id.0),
            None => self.head = Some(id.0),
        }
        self.queued += 1;
        Ok(())
    }

    fn unlink(&mut self, index: u8) {
        let next = self.slots[index as usize].next.take();
        self.slots[index as usize].scheduled = false;

        if self.head == Some(index) {
            self.head = next;
            self.queued -= 1;
            return;
        }

        let mut cursor = self.head;
        while let Some(current) = cursor {
            if self.slots[current as usize].next == Some(index) {
                self.slots[current as usize].next = next;
                self.queued -= 1;
                return;
            }
            cursor = self.slots[current as usize].next;
        }
    }
}
