//! Connection registry - live connections, their outbound channel, and
//! what each one is currently attached to

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::game::{ConnectionId, MatchId, Slot};
use crate::ws::protocol::ServerMsg;

/// What a connection is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    Unmatched,
    Waiting,
    InMatch { match_id: MatchId, slot: Slot },
}

/// Player connection handle for routing messages
#[derive(Debug)]
struct PlayerConnection {
    outbound: mpsc::UnboundedSender<ServerMsg>,
    association: Association,
    connected_at: Instant,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, PlayerConnection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning the receiving end of its outbound channel
    pub fn register(&self, id: ConnectionId) -> mpsc::UnboundedReceiver<ServerMsg> {
        let (outbound, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            id,
            PlayerConnection {
                outbound,
                association: Association::Unmatched,
                connected_at: Instant::now(),
            },
        );
        rx
    }

    /// Drop a connection, returning what it was attached to
    pub fn unregister(&self, id: ConnectionId) -> Option<Association> {
        self.connections.remove(&id).map(|(_, conn)| {
            debug!(
                connection_id = %id,
                connected_for_ms = conn.connected_at.elapsed().as_millis() as u64,
                "Connection unregistered"
            );
            conn.association
        })
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .map(|conn| !conn.outbound.is_closed())
            .unwrap_or(false)
    }

    /// Queue a message for delivery; false if the connection is gone
    pub fn send(&self, id: ConnectionId, msg: ServerMsg) -> bool {
        match self.connections.get(&id) {
            Some(conn) => conn.outbound.send(msg).is_ok(),
            None => false,
        }
    }

    pub fn association(&self, id: ConnectionId) -> Option<Association> {
        self.connections.get(&id).map(|conn| conn.association)
    }

    pub fn mark_waiting(&self, id: ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            conn.association = Association::Waiting;
        }
    }

    /// Leave the waiting state; no effect once matched
    pub fn clear_waiting(&self, id: ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            if conn.association == Association::Waiting {
                conn.association = Association::Unmatched;
            }
        }
    }

    /// Bind to a match seat; false if the connection is already gone
    pub fn bind(&self, id: ConnectionId, match_id: MatchId, slot: Slot) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut conn) => {
                conn.association = Association::InMatch { match_id, slot };
                true
            }
            None => false,
        }
    }

    /// Unbind only if still bound to `match_id`
    pub fn release(&self, id: ConnectionId, match_id: MatchId) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            if matches!(conn.association, Association::InMatch { match_id: m, .. } if m == match_id) {
                conn.association = Association::Unmatched;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn send_reaches_the_registered_receiver() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let mut rx = registry.register(id);

        assert!(registry.send(id, ServerMsg::Waiting));
        assert_eq!(rx.try_recv().unwrap(), ServerMsg::Waiting);
        assert!(!registry.send(Uuid::new_v4(), ServerMsg::Waiting));
    }

    #[test]
    fn dropped_receiver_is_not_live() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let rx = registry.register(id);
        assert!(registry.is_live(id));

        drop(rx);
        assert!(!registry.is_live(id));
    }

    #[test]
    fn release_ignores_other_matches() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let _rx = registry.register(id);
        let (old, new) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(registry.bind(id, new, Slot::Second));
        registry.release(id, old);
        assert_eq!(
            registry.association(id),
            Some(Association::InMatch {
                match_id: new,
                slot: Slot::Second
            })
        );

        registry.release(id, new);
        assert_eq!(registry.association(id), Some(Association::Unmatched));
    }

    #[test]
    fn binding_a_gone_connection_fails() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let _rx = registry.register(id);
        registry.mark_waiting(id);

        assert_eq!(registry.unregister(id), Some(Association::Waiting));
        assert!(!registry.bind(id, Uuid::new_v4(), Slot::First));
        assert_eq!(registry.len(), 0);
    }
}
