//! Logical clock and timer scheduler
//!
//! All session timing runs on one logical millisecond timeline. A
//! [`Scheduler`] holds delayed events; the driver pops the earliest one,
//! moves the [`Clock`] to its due time, and dispatches it. The virtual clock
//! jumps instantly; the wall clock sleeps until the due time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

/// Source of logical time
pub trait Clock {
    /// Milliseconds since the clock started
    fn now_ms(&self) -> u64;

    /// Move time forward to `at_ms`. Never moves backwards.
    fn advance_to(&mut self, at_ms: u64);
}

/// Deterministic clock for tests and simulated sessions
#[derive(Debug, Default, Clone)]
pub struct VirtualClock {
    now: u64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: u64) -> Self {
        Self { now }
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn advance_to(&mut self, at_ms: u64) {
        self.now = self.now.max(at_ms);
    }
}

/// Real-time clock; advancing sleeps the thread
#[derive(Debug, Clone)]
pub struct WallClock {
    start: Instant,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Clock for WallClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn advance_to(&mut self, at_ms: u64) {
        let now = self.now_ms();
        if at_ms > now {
            std::thread::sleep(Duration::from_millis(at_ms - now));
        }
    }
}

/// Handle returned by [`Scheduler::schedule`], used to cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Min-heap of delayed events; ties fire in scheduling order
#[derive(Debug)]
pub struct Scheduler<E> {
    queue: BinaryHeap<Reverse<(u64, u64)>>,
    events: HashMap<u64, E>,
    next_id: u64,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            events: HashMap::new(),
            next_id: 0,
        }
    }

    /// Fire `event` at `now + delay_ms`
    pub fn schedule(&mut self, now: u64, delay_ms: u64, event: E) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Reverse((now + delay_ms, id)));
        self.events.insert(id, event);
        TimerHandle(id)
    }

    /// Cancel a pending event. Returns false if it already fired.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.events.remove(&handle.0).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.events.contains_key(&handle.0)
    }

    /// Due time of the earliest live event
    pub fn next_due(&mut self) -> Option<u64> {
        self.discard_cancelled();
        self.queue.peek().map(|Reverse((at, _))| *at)
    }

    /// Remove and return the earliest live event with its due time
    pub fn pop_next(&mut self) -> Option<(u64, E)> {
        while let Some(Reverse((at, id))) = self.queue.pop() {
            if let Some(event) = self.events.remove(&id) {
                return Some((at, event));
            }
        }
        None
    }

    /// Number of live events
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop everything (abrupt termination)
    pub fn clear(&mut self) {
        self.queue.clear();
        self.events.clear();
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.queue.peek() {
            if self.events.contains_key(id) {
                break;
            }
            self.queue.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_fire_in_due_order() {
        let mut sched = Scheduler::new();
        sched.schedule(0, 300, "c");
        sched.schedule(0, 100, "a");
        sched.schedule(0, 200, "b");
        let order: Vec<_> = std::iter::from_fn(|| sched.pop_next()).collect();
        assert_eq!(order, vec![(100, "a"), (200, "b"), (300, "c")]);
    }

    #[test]
    fn test_ties_keep_scheduling_order() {
        let mut sched = Scheduler::new();
        sched.schedule(0, 50, 1);
        sched.schedule(10, 40, 2);
        assert_eq!(sched.pop_next(), Some((50, 1)));
        assert_eq!(sched.pop_next(), Some((50, 2)));
    }

    #[test]
    fn test_cancelled_event_never_fires() {
        let mut sched = Scheduler::new();
        let a = sched.schedule(0, 100, "a");
        sched.schedule(0, 200, "b");
        assert!(sched.cancel(a));
        assert!(!sched.cancel(a));
        assert_eq!(sched.next_due(), Some(200));
        assert_eq!(sched.pop_next(), Some((200, "b")));
        assert!(sched.pop_next().is_none());
    }

    #[test]
    fn test_virtual_clock_never_goes_back() {
        let mut clock = VirtualClock::new();
        clock.advance_to(500);
        clock.advance_to(200);
        assert_eq!(clock.now_ms(), 500);
    }
}
