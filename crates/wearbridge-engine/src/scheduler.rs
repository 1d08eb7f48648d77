/*!
 * Deferred tasks on the service loop.
 *
 * Timers are not spawned tasks. Each one is an entry in a [`DeferredQueue`]
 * carrying the snapshot it needs to check whether it is still relevant when
 * it fires. The service loop sleeps until [`DeferredQueue::next_deadline`]
 * and then runs whatever [`DeferredQueue::pop_due`] returns.
 */
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::time::Instant;

use wearbridge_core::types::Address;

/// A deferred action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTask {
    /// Put a SCANNED device back to WAITING_FOR_SCAN
    RevertScan {
        /// Device address
        address: Address,
        /// The SCANNED epoch this timer belongs to
        scanned_at: Instant,
    },
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    seq: u64,
    task: DeferredTask,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the heap pops the earliest deadline first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of deferred tasks
#[derive(Debug, Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl DeferredQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a task
    pub fn schedule(&mut self, due: Instant, task: DeferredTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { due, seq, task });
    }

    /// Earliest deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|s| s.due)
    }

    /// Remove and return every task due at `now`, earliest first
    pub fn pop_due(&mut self, now: Instant) -> Vec<DeferredTask> {
        let mut due = Vec::new();
        while self.heap.peek().map(|s| s.due <= now).unwrap_or(false) {
            if let Some(scheduled) = self.heap.pop() {
                due.push(scheduled.task);
            }
        }
        due
    }

    /// Drop every task for a device
    pub fn cancel_for(&mut self, address: &Address) {
        self.heap.retain(|s| match &s.task {
            DeferredTask::RevertScan { address: a, .. } => a != address,
        });
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn revert(address: &str, at: Instant) -> DeferredTask {
        DeferredTask::RevertScan {
            address: Address::new(address),
            scanned_at: at,
        }
    }

    #[test]
    fn test_pop_due_in_deadline_order() {
        let start = Instant::now();
        let mut queue = DeferredQueue::new();
        queue.schedule(start + Duration::from_secs(30), revert("b", start));
        queue.schedule(start + Duration::from_secs(10), revert("a", start));
        queue.schedule(start + Duration::from_secs(10), revert("c", start));
        queue.schedule(start + Duration::from_secs(90), revert("d", start));

        assert_eq!(queue.next_deadline(), Some(start + Duration::from_secs(10)));
        assert!(queue.pop_due(start).is_empty());

        let due = queue.pop_due(start + Duration::from_secs(30));
        assert_eq!(due, vec![revert("a", start), revert("c", start), revert("b", start)]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_cancel_for_device() {
        let start = Instant::now();
        let mut queue = DeferredQueue::new();
        queue.schedule(start, revert("a", start));
        queue.schedule(start, revert("b", start));
        queue.cancel_for(&Address::new("A"));
        assert_eq!(queue.pop_due(start), vec![revert("b", start)]);
        assert!(queue.is_empty());
    }
}
