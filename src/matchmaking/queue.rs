//! Matchmaking queue implementation

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::game::ConnectionId;

/// Connection waiting for an opponent
#[derive(Debug, Clone)]
pub struct WaitingEntry {
    pub connection_id: ConnectionId,
    pub joined_at: Instant,
}

impl WaitingEntry {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            joined_at: Instant::now(),
        }
    }

    /// How long this connection has been waiting
    pub fn wait_time(&self) -> Duration {
        self.joined_at.elapsed()
    }
}

/// FIFO of waiting connections, at most one entry per connection
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    queue: VecDeque<WaitingEntry>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection at the tail
    pub fn enqueue(&mut self, entry: WaitingEntry) {
        // Remove if already in queue (rejoin)
        self.queue.retain(|e| e.connection_id != entry.connection_id);
        self.queue.push_back(entry);
    }

    /// Remove a connection from the queue
    pub fn dequeue(&mut self, connection_id: ConnectionId) -> Option<WaitingEntry> {
        let pos = self
            .queue
            .iter()
            .position(|e| e.connection_id == connection_id)?;
        self.queue.remove(pos)
    }

    /// Pop the oldest entry that is still live, discarding dead ones ahead of it
    pub fn pop_oldest_live(&mut self, is_live: impl Fn(ConnectionId) -> bool) -> Option<WaitingEntry> {
        while let Some(entry) = self.queue.pop_front() {
            if is_live(entry.connection_id) {
                return Some(entry);
            }
        }
        None
    }

    /// Check if a connection is in the queue
    #[cfg(test)]
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.queue.iter().any(|e| e.connection_id == connection_id)
    }

    /// Get queue length
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn rejoin_moves_entry_to_tail_without_duplicates() {
        let mut queue = MatchmakingQueue::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        queue.enqueue(WaitingEntry::new(a));
        queue.enqueue(WaitingEntry::new(b));
        queue.enqueue(WaitingEntry::new(a));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_oldest_live(|_| true).unwrap().connection_id, b);
        assert_eq!(queue.pop_oldest_live(|_| true).unwrap().connection_id, a);
        assert!(queue.is_empty());
    }

    #[test]
    fn dead_entries_are_discarded() {
        let mut queue = MatchmakingQueue::new();
        let (dead, live) = (Uuid::new_v4(), Uuid::new_v4());
        queue.enqueue(WaitingEntry::new(dead));
        queue.enqueue(WaitingEntry::new(live));

        let popped = queue.pop_oldest_live(|id| id == live).unwrap();
        assert_eq!(popped.connection_id, live);
        assert!(!queue.contains(dead));
        assert!(queue.pop_oldest_live(|_| true).is_none());
    }

    #[test]
    fn dequeue_removes_only_that_connection() {
        let mut queue = MatchmakingQueue::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        queue.enqueue(WaitingEntry::new(a));
        queue.enqueue(WaitingEntry::new(b));

        assert!(queue.dequeue(a).is_some());
        assert!(queue.dequeue(a).is_none());
        assert!(queue.contains(b));
    }
}
