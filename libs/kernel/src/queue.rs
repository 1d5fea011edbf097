//! # Packet Queue
//!
//! Per-root, time-ordered delivery buffer.
//!
//! Times come from a counter that is allowed to wrap, so entries are ordered
//! and released by the *signed difference* `a.wrapping_sub(b)` rather than by
//! comparing raw values. This is correct as long as all pending times lie
//! within half the `i64` range of each other.
//!
//! Entries with the same time are delivered in insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use types::Call;

struct Entry {
    time: i64,
    seq: u64,
    call: Call,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap: the earliest entry must compare greatest
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .wrapping_sub(self.time)
            .cmp(&0)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of Calls keyed by delivery time
pub struct PacketQueue {
    heap: BinaryHeap<Entry>,
    cursor: i64,
    next_seq: u64,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Queue whose time cursor starts at `time`
    pub fn starting_at(time: i64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            cursor: time,
            next_seq: 0,
        }
    }

    /// Insert a call keyed by its own time, O(log n)
    pub fn add(&mut self, call: Call) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.heap.push(Entry {
            time: call.time(),
            seq,
            call,
        });
    }

    /// Advance the current time cursor
    pub fn set_time(&mut self, now: i64) {
        self.cursor = now;
    }

    pub fn time(&self) -> i64 {
        self.cursor
    }

    /// Earliest call with `time - cursor <= 0`, O(log n)
    pub fn poll(&mut self) -> Option<Call> {
        let due = self
            .heap
            .peek()
            .is_some_and(|top| top.time.wrapping_sub(self.cursor) <= 0);
        if due {
            self.heap.pop().map(|entry| entry.call)
        } else {
            None
        }
    }

    /// Earliest call regardless of the cursor, used to flush on termination
    pub fn pop_next(&mut self) -> Option<Call> {
        self.heap.pop().map(|entry| entry.call)
    }

    /// Delivery time of the earliest pending call
    pub fn next_due(&self) -> Option<i64> {
        self.heap.peek().map(|top| top.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending call, returns how many were discarded
    pub fn clear(&mut self) -> usize {
        let count = self.heap.len();
        self.heap.clear();
        count
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PacketQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketQueue")
            .field("len", &self.heap.len())
            .field("cursor", &self.cursor)
            .field("next_due", &self.next_due())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{ControlAddress, Value};

    fn call_at(time: i64, tag: i64) -> Call {
        Call::quiet(
            ControlAddress::parse("/root/child.control").unwrap(),
            ControlAddress::parse("/other.sender").unwrap(),
            time,
            1,
            vec![Value::Int(tag)],
        )
    }

    fn tag(call: &Call) -> i64 {
        call.arg(0).as_int().unwrap()
    }

    #[test]
    fn test_basic_ordering() {
        let mut queue = PacketQueue::new();
        queue.add(call_at(2000, 2));
        queue.add(call_at(1000, 1));

        queue.set_time(1000);
        assert_eq!(queue.poll().map(|c| tag(&c)), Some(1));
        assert!(queue.poll().is_none());

        queue.set_time(2500);
        assert_eq!(queue.poll().map(|c| tag(&c)), Some(2));
        assert!(queue.poll().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wraparound_ordering() {
        let t = i64::MAX;
        let mut queue = PacketQueue::starting_at(t - 2000);
        queue.add(call_at(t.wrapping_add(1000), 2));
        queue.add(call_at(t - 1000, 1));

        queue.set_time(t - 1000);
        assert_eq!(queue.poll().map(|c| tag(&c)), Some(1));
        assert!(queue.poll().is_none());

        queue.set_time(t.wrapping_add(1500));
        assert_eq!(queue.poll().map(|c| tag(&c)), Some(2));
        assert!(queue.poll().is_none());
    }

    #[test]
    fn test_equal_times_keep_insertion_order() {
        let mut queue = PacketQueue::new();
        for i in 0..20 {
            queue.add(call_at(50, i));
        }
        queue.set_time(50);
        let order: Vec<i64> = std::iter::from_fn(|| queue.poll()).map(|c| tag(&c)).collect();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_next_ignores_cursor() {
        let mut queue = PacketQueue::new();
        queue.add(call_at(900, 9));
        queue.add(call_at(100, 1));
        assert!(queue.poll().is_none());
        assert_eq!(queue.next_due(), Some(100));
        assert_eq!(queue.pop_next().map(|c| tag(&c)), Some(1));
        assert_eq!(queue.pop_next().map(|c| tag(&c)), Some(9));
        assert_eq!(queue.clear(), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_releases_in_time_then_insertion_order(
            base in proptest::prelude::any::<i64>(),
            offsets in proptest::collection::vec(0i64..1_000_000, 0..64),
        ) {
            let mut queue = PacketQueue::starting_at(base);
            for (i, offset) in offsets.iter().enumerate() {
                queue.add(call_at(base.wrapping_add(*offset), i as i64));
            }
            queue.set_time(base.wrapping_add(1_000_000));
            let released: Vec<i64> = std::iter::from_fn(|| queue.poll()).map(|c| tag(&c)).collect();

            let mut expected: Vec<(i64, i64)> =
                offsets.iter().enumerate().map(|(i, offset)| (*offset, i as i64)).collect();
            expected.sort();
            let expected: Vec<i64> = expected.into_iter().map(|(_, i)| i).collect();
            proptest::prop_assert_eq!(released, expected);
        }
    }
}
