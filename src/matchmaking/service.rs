//! Matchmaking service - pairs waiting connections into matches

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::game::{ConnectionId, MatchCommand, MatchId, MatchRegistry, Slot};
use crate::ws::protocol::ServerMsg;

use super::connections::ConnectionRegistry;
use super::queue::{MatchmakingQueue, WaitingEntry};

/// Result of a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Waiting,
    MatchCreated { match_id: MatchId, slot: Slot },
    /// Already seated; the match re-sent its state
    Resynced { match_id: MatchId, slot: Slot },
}

/// Matchmaking service
pub struct MatchmakingService {
    queue: Mutex<MatchmakingQueue>,
    connections: Arc<ConnectionRegistry>,
    registry: Arc<MatchRegistry>,
}

impl MatchmakingService {
    pub fn new(connections: Arc<ConnectionRegistry>, registry: Arc<MatchRegistry>) -> Self {
        Self {
            queue: Mutex::new(MatchmakingQueue::new()),
            connections,
            registry,
        }
    }

    /// Queue a connection, or pair it with the oldest live waiting one
    pub async fn join(&self, connection_id: ConnectionId) -> JoinOutcome {
        if let Some((handle, slot)) = self.registry.find_by_connection(connection_id) {
            if handle.send(MatchCommand::Resync { slot }).await.is_ok() {
                return JoinOutcome::Resynced {
                    match_id: handle.id,
                    slot,
                };
            }
        }

        // Only the queue mutation is under the lock; the waiting notice goes
        // out before a later joiner can pair with this connection
        let partner = {
            let mut queue = self.queue.lock().await;
            queue.dequeue(connection_id);
            let partner = queue.pop_oldest_live(|id| self.connections.is_live(id));
            if partner.is_none() {
                queue.enqueue(WaitingEntry::new(connection_id));
                self.connections.mark_waiting(connection_id);
                self.connections.send(connection_id, ServerMsg::Waiting);
            }
            partner
        };

        match partner {
            None => {
                info!(connection_id = %connection_id, "Connection waiting for opponent");
                JoinOutcome::Waiting
            }
            Some(entry) => {
                info!(
                    connection_id = %connection_id,
                    opponent = %entry.connection_id,
                    waited_ms = entry.wait_time().as_millis() as u64,
                    "Paired waiting connections"
                );
                let match_id = self.registry.create(entry.connection_id, connection_id);
                JoinOutcome::MatchCreated {
                    match_id,
                    slot: Slot::Second,
                }
            }
        }
    }

    /// Leave the queue; true if the connection was waiting
    pub async fn leave(&self, connection_id: ConnectionId) -> bool {
        let removed = self.queue.lock().await.dequeue(connection_id).is_some();
        if removed {
            self.connections.clear_waiting(connection_id);
        }
        removed
    }

    /// Get current queue size
    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::matchmaking::Association;
    use tokio_test::assert_ok;
    use uuid::Uuid;

    fn service() -> (MatchmakingService, Arc<ConnectionRegistry>, Arc<MatchRegistry>) {
        let connections = Arc::new(ConnectionRegistry::new());
        let registry = Arc::new(MatchRegistry::new(connections.clone(), GameConfig::default()));
        (
            MatchmakingService::new(connections.clone(), registry.clone()),
            connections,
            registry,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_join_waits_second_pairs() {
        let (mm, connections, registry) = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut ra = connections.register(a);
        let _rb = connections.register(b);

        assert_eq!(mm.join(a).await, JoinOutcome::Waiting);
        assert_eq!(assert_ok!(ra.try_recv()), ServerMsg::Waiting);
        assert_eq!(connections.association(a), Some(Association::Waiting));

        let outcome = mm.join(b).await;
        let JoinOutcome::MatchCreated { match_id, slot } = outcome else {
            panic!("expected a match, got {outcome:?}");
        };
        assert_eq!(slot, Slot::Second);
        assert_eq!(mm.queue_size().await, 0);
        assert_eq!(
            connections.association(a),
            Some(Association::InMatch {
                match_id,
                slot: Slot::First
            })
        );
        assert!(registry.get(&match_id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rejoining_while_waiting_never_self_pairs() {
        let (mm, connections, _) = service();
        let a = Uuid::new_v4();
        let _ra = connections.register(a);

        assert_eq!(mm.join(a).await, JoinOutcome::Waiting);
        assert_eq!(mm.join(a).await, JoinOutcome::Waiting);
        assert_eq!(mm.queue_size().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_waiting_connection_is_skipped() {
        let (mm, connections, registry) = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ra = connections.register(a);
        let _rb = connections.register(b);

        mm.join(a).await;
        drop(ra);

        assert_eq!(mm.join(b).await, JoinOutcome::Waiting);
        let queue = mm.queue.lock().await;
        assert!(queue.contains(b));
        assert!(!queue.contains(a));
        drop(queue);
        assert_eq!(registry.active_matches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn join_while_seated_resyncs() {
        let (mm, connections, _) = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let _ra = connections.register(a);
        let _rb = connections.register(b);

        mm.join(a).await;
        let JoinOutcome::MatchCreated { match_id, .. } = mm.join(b).await else {
            panic!("expected a match");
        };

        assert_eq!(
            mm.join(a).await,
            JoinOutcome::Resynced {
                match_id,
                slot: Slot::First
            }
        );
        assert_eq!(mm.queue_size().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_notice_precedes_match_start() {
        let (mm, connections, _) = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut ra = connections.register(a);
        let _rb = connections.register(b);

        let (first, second) = tokio::join!(mm.join(a), mm.join(b));
        assert!(matches!(
            (first, second),
            (JoinOutcome::Waiting, JoinOutcome::MatchCreated { .. })
        ));

        assert_eq!(ra.recv().await, Some(ServerMsg::Waiting));
        assert!(matches!(ra.recv().await, Some(ServerMsg::MatchStart { slot: Slot::First, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn leave_clears_waiting_state() {
        let (mm, connections, _) = service();
        let a = Uuid::new_v4();
        let _ra = connections.register(a);

        mm.join(a).await;
        assert!(mm.leave(a).await);
        assert!(!mm.leave(a).await);
        assert_eq!(connections.association(a), Some(Association::Unmatched));
    }
}
