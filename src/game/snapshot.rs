//! Per-recipient message building from match state and resolutions

use crate::ws::protocol::{PlayerView, ServerMsg};

use super::r#match::{Match, MatchResult, Outcome, PlayerState, Resolution, Slot};
use super::MoveKind;

pub fn player_view(state: &PlayerState) -> PlayerView {
    PlayerView {
        health: state.health,
        max_health: state.max_health,
        mana: state.mana,
        max_mana: state.max_mana,
        defending: state.defending,
        special_active: state.special_active,
        special_used: state.special_used,
    }
}

/// Opening state for `slot` (also used for resync)
pub fn match_start(game: &Match, slot: Slot) -> ServerMsg {
    ServerMsg::MatchStart {
        match_id: game.id,
        slot,
        you: player_view(game.state(slot)),
        enemy: player_view(game.state(slot.other())),
        your_turn: game.is_active() && game.turn() == slot,
        turn_count: game.turn_count(),
    }
}

pub fn match_ended(result: MatchResult, slot: Slot) -> ServerMsg {
    ServerMsg::MatchEnded {
        did_you_win: result.winner == slot,
        reason: result.reason,
    }
}

/// Messages for both seats, in delivery order
pub fn build(game: &Match, res: &Resolution) -> Vec<(Slot, ServerMsg)> {
    let mut out = Vec::new();

    for tick in &res.ticks {
        for slot in Slot::BOTH {
            out.push((
                slot,
                ServerMsg::EffectTriggered {
                    owner_slot: tick.owner,
                    damage: tick.damage,
                    turns_remaining: tick.turns_remaining,
                },
            ));
        }
    }

    if res.kind != MoveKind::Surrender {
        let your_turn = |slot: Slot| match res.outcome {
            Outcome::Continue { next_turn } => next_turn == slot,
            Outcome::Finished(_) => false,
        };
        let actor = res.actor;
        let other = actor.other();

        out.push((
            actor,
            ServerMsg::MoveAccepted {
                kind: res.kind,
                description: res.description.clone(),
                you: player_view(game.state(actor)),
                enemy: player_view(game.state(other)),
                your_turn: your_turn(actor),
                forced: res.forced,
            },
        ));
        out.push((
            other,
            ServerMsg::OpponentMoved {
                kind: res.kind,
                description: res.description.clone(),
                you: player_view(game.state(other)),
                enemy: player_view(game.state(actor)),
                your_turn: your_turn(other),
                forced: res.forced,
            },
        ));
    }

    if let Outcome::Finished(result) = res.outcome {
        for slot in Slot::BOTH {
            out.push((slot, match_ended(result, slot)));
        }
    }

    out
}
