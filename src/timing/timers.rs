use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

struct Entry<T> {
    deadline: Instant,
    handle: TimerHandle,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.handle == other.handle
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.handle.cmp(&other.handle))
    }
}

/// Deadline-ordered queue of cancellable timers.
///
/// Timers with equal deadlines fire in the order they were scheduled. A cancelled
/// timer is never returned by [`TimerQueue::pop_due`].
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    live: HashSet<TimerHandle>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next_id: 0,
        }
    }

    pub fn schedule(&mut self, deadline: Instant, payload: T) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.live.insert(handle);
        self.heap.push(Reverse(Entry {
            deadline,
            handle,
            payload,
        }));
        handle
    }

    /// Returns false if the timer already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.live.remove(&handle)
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.live.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Earliest deadline among pending timers.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Removes and returns the earliest timer whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerHandle, Instant, T)> {
        self.discard_cancelled();
        if self.heap.peek()?.0.deadline > now {
            return None;
        }
        let Reverse(entry) = self.heap.pop()?;
        self.live.remove(&entry.handle);
        Some((entry.handle, entry.deadline, entry.payload))
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse(head)) = self.heap.peek() {
            if self.live.contains(&head.handle) {
                break;
            }
            self.heap.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let t0 = Instant::now();
        let mut timers = TimerQueue::new();
        timers.schedule(t0 + Duration::from_millis(30), "c");
        timers.schedule(t0 + Duration::from_millis(10), "a");
        timers.schedule(t0 + Duration::from_millis(20), "b");

        let fired: Vec<&str> = std::iter::from_fn(|| timers.pop_due(t0 + Duration::from_secs(1)))
            .map(|(_, _, payload)| payload)
            .collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn equal_deadlines_keep_scheduling_order() {
        let t0 = Instant::now();
        let at = t0 + Duration::from_millis(5);
        let mut timers = TimerQueue::new();
        for i in 0..5 {
            timers.schedule(at, i);
        }

        let fired: Vec<i32> = std::iter::from_fn(|| timers.pop_due(at))
            .map(|(_, _, payload)| payload)
            .collect();
        assert_eq!(fired, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn nothing_fires_before_deadline() {
        let t0 = Instant::now();
        let mut timers = TimerQueue::new();
        timers.schedule(t0 + Duration::from_millis(100), ());

        assert!(timers.pop_due(t0 + Duration::from_millis(99)).is_none());
        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_millis(100)));
        assert!(timers.pop_due(t0 + Duration::from_millis(100)).is_some());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let t0 = Instant::now();
        let mut timers = TimerQueue::new();
        let first = timers.schedule(t0, 1);
        let second = timers.schedule(t0 + Duration::from_millis(1), 2);

        assert!(timers.cancel(first));
        assert!(!timers.cancel(first));
        assert!(!timers.is_pending(first));
        assert!(timers.is_pending(second));
        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_millis(1)));

        let (handle, _, payload) = timers.pop_due(t0 + Duration::from_secs(1)).unwrap();
        assert_eq!((handle, payload), (second, 2));
        assert!(timers.pop_due(t0 + Duration::from_secs(1)).is_none());
        assert_eq!(timers.next_deadline(), None);
    }
}
