//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{EndReason, MoveError, MoveKind, Slot};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter matchmaking, or resync when already in a match
    Join,

    /// Submit a move; kept as text so unknown names reach the match as a rejection
    Move {
        #[serde(rename = "move")]
        kind: String,
    },

    /// Chat line for the opponent
    Chat { message: String },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
    },

    /// Queued, no opponent yet
    Waiting,

    /// Paired (or resynced) into a match
    MatchStart {
        match_id: Uuid,
        slot: Slot,
        you: PlayerView,
        enemy: PlayerView,
        your_turn: bool,
        turn_count: u32,
    },

    /// The recipient's own move went through
    MoveAccepted {
        #[serde(rename = "move")]
        kind: MoveKind,
        description: String,
        you: PlayerView,
        enemy: PlayerView,
        your_turn: bool,
        /// Applied by the turn timer
        forced: bool,
    },

    /// The recipient's move was refused; nothing changed
    MoveRejected { reason: MoveError },

    /// The other participant's move went through
    OpponentMoved {
        #[serde(rename = "move")]
        kind: MoveKind,
        description: String,
        you: PlayerView,
        enemy: PlayerView,
        your_turn: bool,
        forced: bool,
    },

    /// A damage-over-time effect fired
    EffectTriggered {
        owner_slot: Slot,
        damage: u32,
        turns_remaining: u32,
    },

    /// Match has ended
    MatchEnded {
        did_you_win: bool,
        reason: EndReason,
    },

    /// Relayed chat line
    Chat { message: String, from_slot: Slot },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// One side's state as shown to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub health: u32,
    pub max_health: u32,
    pub mana: u32,
    pub max_mana: u32,
    pub defending: bool,
    pub special_active: u32,
    pub special_used: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_move_uses_move_field() {
        let msg: ClientMsg = serde_json::from_value(json!({"type": "move", "move": "attack"})).unwrap();
        assert!(matches!(msg, ClientMsg::Move { kind } if kind == "attack"));

        let msg: ClientMsg = serde_json::from_value(json!({"type": "join"})).unwrap();
        assert!(matches!(msg, ClientMsg::Join));
    }

    #[test]
    fn rejection_and_end_codes_are_snake_case() {
        let rejected = serde_json::to_value(ServerMsg::MoveRejected {
            reason: MoveError::NotYourTurn,
        })
        .unwrap();
        assert_eq!(rejected, json!({"type": "move_rejected", "reason": "not_your_turn"}));

        let ended = serde_json::to_value(ServerMsg::MatchEnded {
            did_you_win: true,
            reason: EndReason::Disconnect,
        })
        .unwrap();
        assert_eq!(
            ended,
            json!({"type": "match_ended", "did_you_win": true, "reason": "disconnect"})
        );
    }

    #[test]
    fn serde_codes_match_move_error_codes() {
        for err in [
            MoveError::NotInQueueOrMatch,
            MoveError::MatchNotActive,
            MoveError::NotYourTurn,
            MoveError::InsufficientResource,
            MoveError::UnknownMove,
            MoveError::SpecialAlreadyUsed,
            MoveError::OnCooldown,
        ] {
            assert_eq!(serde_json::to_value(err).unwrap(), json!(err.code()));
        }
    }
}
