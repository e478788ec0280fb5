//! Cancelable deferred triggers
//!
//! The condition monitor never sleeps. It asks a [`Scheduler`] for a timer and
//! the session drains expired timers between frames.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::monitor::Condition;

/// Opaque handle to one scheduled trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// A trigger whose deadline has passed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    pub handle: TimerHandle,
    pub condition: Condition,
    pub deadline: DateTime<Utc>,
}

pub trait Scheduler: Send {
    /// Schedule a trigger for `condition` after `delay`
    fn schedule(&mut self, condition: Condition, delay: Duration) -> TimerHandle;

    /// Cancel a pending trigger. Returns false if it already fired or never existed.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Remove and return every trigger whose deadline is at or before now,
    /// earliest first
    fn take_expired(&mut self) -> Vec<FiredTimer>;

    fn pending(&self) -> usize;

    fn next_deadline(&self) -> Option<DateTime<Utc>>;
}

/// Deadline list evaluated against a [`Clock`]
pub struct DeadlineScheduler {
    clock: Arc<dyn Clock>,
    timers: Vec<FiredTimer>,
    next_id: u64,
}

impl DeadlineScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: Vec::new(),
            next_id: 0,
        }
    }
}

impl Scheduler for DeadlineScheduler {
    fn schedule(&mut self, condition: Condition, delay: Duration) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.timers.push(FiredTimer {
            handle,
            condition,
            deadline: self
                .clock
                .now()
                .checked_add_signed(delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.handle != handle);
        self.timers.len() != before
    }

    fn take_expired(&mut self) -> Vec<FiredTimer> {
        let now = self.clock.now();
        let (mut expired, pending): (Vec<_>, Vec<_>) =
            self.timers.drain(..).partition(|timer| timer.deadline <= now);
        self.timers = pending;

        // handles are issued in schedule order
        expired.sort_by_key(|timer| (timer.deadline, timer.handle));
        expired
    }

    fn pending(&self) -> usize {
        self.timers.len()
    }

    fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.iter().map(|timer| timer.deadline).min()
    }
}
