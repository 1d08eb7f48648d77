/*!
 * Offline notification cache.
 */
use std::collections::VecDeque;

use tracing::debug;

use wearbridge_devices::model::NotificationSpec;

/// Default number of notifications kept per device
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded FIFO of notifications waiting for a device to come online.
///
/// Appending to a full queue evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct PendingCommandQueue {
    entries: VecDeque<NotificationSpec>,
    capacity: usize,
}

impl Default for PendingCommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PendingCommandQueue {
    /// Create a queue holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a notification, returning the evicted one if the queue was full
    pub fn push(&mut self, spec: NotificationSpec) -> Option<NotificationSpec> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            debug!(id = ?old.id, "Pending queue full, evicting oldest");
        }
        self.entries.push_back(spec);
        evicted
    }

    /// Remove every queued notification with identity `id`
    pub fn remove_notification(&mut self, id: i32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|spec| spec.id != Some(id));
        self.entries.len() != before
    }

    /// Take everything in FIFO order, leaving the queue empty
    pub fn drain(&mut self) -> Vec<NotificationSpec> {
        self.entries.drain(..).collect()
    }

    /// Queued identities in order
    pub fn ids(&self) -> Vec<Option<i32>> {
        self.entries.iter().map(|spec| spec.id).collect()
    }

    /// Number of queued notifications
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: i32) -> NotificationSpec {
        NotificationSpec::new(format!("n{}", id), "").with_id(id)
    }

    #[test]
    fn test_eleven_appends_keep_the_last_ten() {
        let mut queue = PendingCommandQueue::default();
        for id in 1..=11 {
            let evicted = queue.push(note(id));
            assert_eq!(evicted.map(|n| n.id), if id == 11 { Some(Some(1)) } else { None });
        }
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.ids(), (2..=11).map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn test_delete_removes_queued_identity() {
        let mut queue = PendingCommandQueue::default();
        queue.push(note(5));
        assert!(queue.remove_notification(5));
        assert!(queue.is_empty());
        assert!(!queue.remove_notification(5));
    }

    #[test]
    fn test_drain_is_fifo() {
        let mut queue = PendingCommandQueue::new(3);
        for id in [7, 8, 9] {
            queue.push(note(id));
        }
        let drained: Vec<_> = queue.drain().into_iter().map(|n| n.id).collect();
        assert_eq!(drained, vec![Some(7), Some(8), Some(9)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut queue = PendingCommandQueue::new(0);
        queue.push(note(1));
        queue.push(note(2));
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.ids(), vec![Some(2)]);
    }
}
