//! Routes inbound connection events to matchmaking and match executors

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::game::{ConnectionId, EndReason, MatchCommand, MoveError};
use crate::matchmaking::service::JoinOutcome;
use crate::matchmaking::Association;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::AppState;

impl AppState {
    /// Register a new connection and greet it
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMsg>) {
        let connection_id = Uuid::new_v4();
        let rx = self.connections.register(connection_id);
        self.connections.send(
            connection_id,
            ServerMsg::Welcome {
                connection_id,
                server_time: unix_millis(),
            },
        );
        info!(connection_id = %connection_id, "Connection registered");
        (connection_id, rx)
    }

    pub async fn handle_message(&self, connection_id: ConnectionId, msg: ClientMsg) {
        match msg {
            ClientMsg::Join => {
                match self.matchmaking.join(connection_id).await {
                    JoinOutcome::Waiting => {
                        debug!(connection_id = %connection_id, "Join queued");
                    }
                    JoinOutcome::MatchCreated { match_id, slot } => {
                        debug!(connection_id = %connection_id, match_id = %match_id, slot = u8::from(slot), "Join paired");
                    }
                    JoinOutcome::Resynced { match_id, slot } => {
                        debug!(connection_id = %connection_id, match_id = %match_id, slot = u8::from(slot), "Join resynced");
                    }
                }
            }
            ClientMsg::Move { kind } => self.submit_move(connection_id, kind).await,
            ClientMsg::Chat { message } => {
                if let Some((handle, slot)) = self.match_registry.find_by_connection(connection_id) {
                    let _ = handle.send(MatchCommand::Chat { slot, message }).await;
                }
            }
            ClientMsg::Ping { t } => {
                self.connections.send(connection_id, ServerMsg::Pong { t });
            }
        }
    }

    /// Forward a move to the connection's match, or reject it here
    pub async fn submit_move(&self, connection_id: ConnectionId, kind: String) {
        let result = match self.match_registry.find_by_connection(connection_id) {
            Some((handle, slot)) => handle.send(MatchCommand::Move { slot, kind }).await,
            None => Err(MoveError::NotInQueueOrMatch),
        };
        if let Err(reason) = result {
            debug!(connection_id = %connection_id, %reason, "Move rejected before reaching a match");
            self.connections
                .send(connection_id, ServerMsg::MoveRejected { reason });
        }
    }

    /// Tear down a connection: leave the queue, forfeit any running match
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let association = self.connections.unregister(connection_id);
        self.matchmaking.leave(connection_id).await;

        if let Some(Association::InMatch { match_id, slot }) = association {
            if let Some(handle) = self.match_registry.remove(&match_id) {
                info!(
                    match_id = %match_id,
                    connection_id = %connection_id,
                    "Participant disconnected, forfeiting match"
                );
                let _ = handle
                    .send(MatchCommand::Forfeit {
                        slot,
                        reason: EndReason::Disconnect,
                    })
                    .await;
            }
        }

        info!(connection_id = %connection_id, "Connection closed");
    }
}
