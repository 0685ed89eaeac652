//! Virtual-time timer service.
//!
//! `EventLoop` is the scheduler every simulated node runs its timers on. It
//! never sleeps: time only moves when an event is popped (or when the caller
//! advances it to the host's virtual clock), which lets tests drive a driver
//! synchronously.
//!
//! # Invariants
//!
//! - Events pop in non-decreasing time order
//! - Events scheduled for the same instant pop in insertion order
//! - `now()` never goes backwards

use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    time::Duration,
};

/// Handle of one scheduled event, unique within its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

/// An item waiting in the queue.
#[derive(Debug)]
struct Scheduled<T> {
    at: Duration,
    id: EventId,
    item: T,
}

// Ordered by (time, insertion); the item itself never takes part.
impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl<T> Eq for Scheduled<T> {}

impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.id).cmp(&(other.at, other.id))
    }
}

/// Discrete-event queue keyed by virtual time.
#[derive(Debug)]
pub struct EventLoop<T> {
    now: Duration,
    next_id: u64,
    queue: BinaryHeap<Reverse<Scheduled<T>>>,
}

impl<T> Default for EventLoop<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventLoop<T> {
    /// Empty loop at time zero.
    pub fn new() -> Self {
        Self { now: Duration::ZERO, next_id: 0, queue: BinaryHeap::new() }
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Schedule `item` to fire once, `delay` after the current time.
    pub fn schedule_once(&mut self, delay: Duration, item: T) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.queue.push(Reverse(Scheduled { at: self.now + delay, id, item }));
        id
    }

    /// Time of the earliest pending event.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.peek().map(|Reverse(s)| s.at)
    }

    /// Move the clock forward to `now` without firing anything.
    ///
    /// Earlier times are ignored.
    pub fn advance_to(&mut self, now: Duration) {
        self.now = self.now.max(now);
    }

    /// Pop the earliest event, advancing the clock to its time.
    pub fn pop(&mut self) -> Option<(Duration, T)> {
        let Reverse(scheduled) = self.queue.pop()?;
        self.now = self.now.max(scheduled.at);
        Some((scheduled.at, scheduled.item))
    }

    /// Pop the earliest event only if it is due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<(Duration, T)> {
        match self.next_deadline() {
            Some(at) if at <= now => self.pop(),
            _ => None,
        }
    }
}
