//! Match executor - one task per match serializes moves, chat, forfeits,
//! and turn-timer expiry

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::matchmaking::{Association, ConnectionRegistry};
use crate::ws::protocol::ServerMsg;

use super::r#match::{
    ConnectionId, EndReason, Match, MatchId, MatchPhase, MatchResult, MoveError, Outcome, Resolution,
    Slot,
};
use super::snapshot;
use super::timer::TurnTimer;

const COMMAND_BUFFER: usize = 64;

/// Work for a match executor
#[derive(Debug, Clone)]
pub enum MatchCommand {
    Move { slot: Slot, kind: String },
    Chat { slot: Slot, message: String },
    /// Re-send the opening state to one seat
    Resync { slot: Slot },
    Forfeit { slot: Slot, reason: EndReason },
    /// Idle eviction; the seat to move loses
    Evict,
}

/// Handle to a running match
#[derive(Clone, Debug)]
pub struct MatchHandle {
    pub id: MatchId,
    pub players: [ConnectionId; 2],
    command_tx: mpsc::Sender<MatchCommand>,
    last_activity: Arc<Mutex<Instant>>,
}

impl MatchHandle {
    /// Deliver a command; fails once the executor has exited
    pub async fn send(&self, cmd: MatchCommand) -> Result<(), MoveError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| MoveError::MatchNotActive)
    }

    /// Non-blocking variant for use outside async contexts
    pub fn try_send(&self, cmd: MatchCommand) -> Result<(), MoveError> {
        self.command_tx
            .try_send(cmd)
            .map_err(|_| MoveError::MatchNotActive)
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_activity.lock())
    }
}

/// The authoritative match executor
pub struct GameMatch {
    game: Match,
    timer: TurnTimer,
    command_rx: mpsc::Receiver<MatchCommand>,
    connections: Arc<ConnectionRegistry>,
    last_activity: Arc<Mutex<Instant>>,
    chat_max_len: usize,
}

enum Wake {
    Command(Option<MatchCommand>),
    TurnExpired,
}

impl GameMatch {
    pub fn new(
        game: Match,
        timer: TurnTimer,
        connections: Arc<ConnectionRegistry>,
        chat_max_len: usize,
    ) -> (Self, MatchHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let last_activity = Arc::new(Mutex::new(game.last_activity()));

        let handle = MatchHandle {
            id: game.id,
            players: game.players,
            command_tx,
            last_activity: last_activity.clone(),
        };

        let game_match = Self {
            game,
            timer,
            command_rx,
            connections,
            last_activity,
            chat_max_len,
        };

        (game_match, handle)
    }

    /// Run until the match finishes or every handle is dropped
    pub async fn run(mut self) -> Option<MatchResult> {
        info!(match_id = %self.game.id, "Match started");

        self.timer.arm();
        for slot in Slot::BOTH {
            self.deliver(slot, snapshot::match_start(&self.game, slot));
        }

        while self.game.is_active() {
            let wake = tokio::select! {
                biased;
                cmd = self.command_rx.recv() => Wake::Command(cmd),
                _ = self.timer.expired() => Wake::TurnExpired,
            };

            match wake {
                Wake::Command(Some(cmd)) => self.handle_command(cmd),
                Wake::Command(None) => {
                    debug!(match_id = %self.game.id, "All handles dropped");
                    break;
                }
                Wake::TurnExpired => self.handle_turn_expired(),
            }
        }

        self.timer.disarm();
        self.reject_pending();
        match self.game.phase() {
            MatchPhase::Finished(result) => {
                info!(
                    match_id = %self.game.id,
                    winner = u8::from(result.winner),
                    reason = ?result.reason,
                    turns = self.game.turn_count(),
                    "Match ended"
                );
                Some(result)
            }
            MatchPhase::Active => None,
        }
    }

    fn handle_command(&mut self, cmd: MatchCommand) {
        match cmd {
            MatchCommand::Move { slot, kind } => {
                match self.game.apply_named(slot, &kind, Instant::now()) {
                    Ok(res) => {
                        debug!(
                            match_id = %self.game.id,
                            slot = u8::from(slot),
                            kind = %res.kind,
                            "Move accepted"
                        );
                        self.after_resolution(&res);
                    }
                    Err(reason) => {
                        debug!(match_id = %self.game.id, slot = u8::from(slot), %reason, "Move rejected");
                        self.deliver(slot, ServerMsg::MoveRejected { reason });
                    }
                }
            }
            MatchCommand::Chat { slot, message } => self.relay_chat(slot, &message),
            MatchCommand::Resync { slot } => {
                self.deliver(slot, snapshot::match_start(&self.game, slot));
            }
            MatchCommand::Forfeit { slot, reason } => self.end_by_forfeit(slot, reason),
            MatchCommand::Evict => {
                info!(match_id = %self.game.id, "Evicting idle match");
                self.end_by_forfeit(self.game.turn(), EndReason::Timeout);
            }
        }
    }

    fn handle_turn_expired(&mut self) {
        let slot = self.game.turn();
        info!(match_id = %self.game.id, slot = u8::from(slot), "Turn timer expired, forcing skip");
        if let Ok(res) = self.game.force_skip(Instant::now()) {
            self.after_resolution(&res);
        }
    }

    /// Answer moves still queued behind the finishing one
    fn reject_pending(&mut self) {
        self.command_rx.close();
        while let Ok(cmd) = self.command_rx.try_recv() {
            if let MatchCommand::Move { slot, .. } = cmd {
                self.deliver(
                    slot,
                    ServerMsg::MoveRejected {
                        reason: MoveError::MatchNotActive,
                    },
                );
            }
        }
    }

    fn after_resolution(&mut self, res: &Resolution) {
        // Forced skips are not player activity; idle eviction must still fire
        if !res.forced {
            *self.last_activity.lock() = self.game.last_activity();
        }
        match res.outcome {
            Outcome::Continue { .. } => self.timer.arm(),
            Outcome::Finished(_) => self.timer.disarm(),
        }
        for (slot, msg) in snapshot::build(&self.game, res) {
            self.deliver(slot, msg);
        }
    }

    fn end_by_forfeit(&mut self, loser: Slot, reason: EndReason) {
        if let Some(result) = self.game.forfeit(loser, reason) {
            self.timer.disarm();
            for slot in Slot::BOTH {
                self.deliver(slot, snapshot::match_ended(result, slot));
            }
        }
    }

    fn relay_chat(&self, slot: Slot, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        let message: String = message.chars().take(self.chat_max_len).collect();
        self.deliver(
            slot.other(),
            ServerMsg::Chat {
                message,
                from_slot: slot,
            },
        );
    }

    fn deliver(&self, slot: Slot, msg: ServerMsg) {
        let connection_id = self.game.players[slot.index()];
        if let Some(Association::InMatch { match_id, .. }) = self.connections.association(connection_id) {
            if match_id != self.game.id {
                debug!(
                    match_id = %self.game.id,
                    connection_id = %connection_id,
                    "Seat rebound to another match, not delivering"
                );
                return;
            }
        }
        if !self.connections.send(connection_id, msg) {
            debug!(
                match_id = %self.game.id,
                connection_id = %connection_id,
                "Dropped message for closed connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::combat::{CombatRules, MoveKind};
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    struct Harness {
        handle: MatchHandle,
        task: tokio::task::JoinHandle<Option<MatchResult>>,
        rx: [UnboundedReceiver<ServerMsg>; 2],
    }

    fn start(turn_timeout: Option<Duration>, max_health: u32) -> Harness {
        let connections = Arc::new(ConnectionRegistry::new());
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let rx = [connections.register(ids[0]), connections.register(ids[1])];
        let game = Match::new(
            Uuid::new_v4(),
            ids,
            CombatRules::default(),
            max_health,
            Instant::now(),
        );
        let (runner, handle) = GameMatch::new(game, TurnTimer::new(turn_timeout), connections, 10);
        let task = tokio::spawn(runner.run());
        Harness { handle, task, rx }
    }

    async fn next(rx: &mut UnboundedReceiver<ServerMsg>) -> ServerMsg {
        rx.recv().await.expect("channel open")
    }

    fn move_cmd(slot: Slot, kind: MoveKind) -> MatchCommand {
        MatchCommand::Move {
            slot,
            kind: kind.as_str().to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_forces_skip_for_idle_player() {
        let mut h = start(Some(Duration::from_secs(30)), 100);
        let [rx0, rx1] = &mut h.rx;
        assert!(matches!(next(rx0).await, ServerMsg::MatchStart { your_turn: true, .. }));
        assert!(matches!(next(rx1).await, ServerMsg::MatchStart { your_turn: false, .. }));

        // paused clock auto-advances to the deadline
        match next(rx0).await {
            ServerMsg::MoveAccepted { kind, forced, your_turn, .. } => {
                assert_eq!(kind, MoveKind::Skip);
                assert!(forced);
                assert!(!your_turn);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            next(rx1).await,
            ServerMsg::OpponentMoved { kind: MoveKind::Skip, forced: true, your_turn: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_move_rearms_the_timer() {
        let mut h = start(Some(Duration::from_secs(30)), 100);
        let [rx0, rx1] = &mut h.rx;
        next(rx0).await;
        next(rx1).await;

        tokio::time::advance(Duration::from_secs(20)).await;
        h.handle.send(move_cmd(Slot::First, MoveKind::Attack)).await.unwrap();
        assert!(matches!(next(rx0).await, ServerMsg::MoveAccepted { forced: false, .. }));
        next(rx1).await;

        let start = Instant::now();
        assert!(matches!(next(rx1).await, ServerMsg::MoveAccepted { forced: true, .. }));
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_goes_only_to_the_sender() {
        let mut h = start(None, 100);
        let [rx0, rx1] = &mut h.rx;
        next(rx0).await;
        next(rx1).await;

        h.handle.send(move_cmd(Slot::Second, MoveKind::Attack)).await.unwrap();
        assert_eq!(
            next(rx1).await,
            ServerMsg::MoveRejected {
                reason: MoveError::NotYourTurn
            }
        );
        assert!(rx0.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn forfeit_reports_once_and_stops_the_executor() {
        let mut h = start(Some(Duration::from_secs(5)), 100);
        let [rx0, rx1] = &mut h.rx;
        next(rx0).await;
        next(rx1).await;

        h.handle
            .send(MatchCommand::Forfeit {
                slot: Slot::Second,
                reason: EndReason::Disconnect,
            })
            .await
            .unwrap();

        assert_eq!(
            next(rx0).await,
            ServerMsg::MatchEnded {
                did_you_win: true,
                reason: EndReason::Disconnect
            }
        );
        let result = h.task.await.unwrap().unwrap();
        assert_eq!(result.winner, Slot::First);
        assert!(h.handle.is_closed());
        assert!(h.handle.send(MatchCommand::Evict).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn chat_is_trimmed_truncated_and_relayed() {
        let mut h = start(None, 100);
        let [rx0, rx1] = &mut h.rx;
        next(rx0).await;
        next(rx1).await;

        h.handle
            .send(MatchCommand::Chat {
                slot: Slot::First,
                message: "   ".to_string(),
            })
            .await
            .unwrap();
        h.handle
            .send(MatchCommand::Chat {
                slot: Slot::First,
                message: "  good luck, have fun  ".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            next(rx1).await,
            ServerMsg::Chat {
                message: "good luck,".to_string(),
                from_slot: Slot::First
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn evict_costs_the_seat_to_move() {
        let mut h = start(None, 100);
        let [rx0, rx1] = &mut h.rx;
        next(rx0).await;
        next(rx1).await;

        h.handle.send(MatchCommand::Evict).await.unwrap();
        assert_eq!(
            next(rx0).await,
            ServerMsg::MatchEnded {
                did_you_win: false,
                reason: EndReason::Timeout
            }
        );
        assert_eq!(
            next(rx1).await,
            ServerMsg::MatchEnded {
                did_you_win: true,
                reason: EndReason::Timeout
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn moves_queued_behind_the_finish_are_rejected() {
        let mut h = start(None, 30);
        let [rx0, rx1] = &mut h.rx;
        next(rx0).await;
        next(rx1).await;

        h.handle.send(move_cmd(Slot::First, MoveKind::Skill)).await.unwrap();
        h.handle.send(move_cmd(Slot::Second, MoveKind::Attack)).await.unwrap();

        assert!(matches!(next(rx1).await, ServerMsg::OpponentMoved { kind: MoveKind::Skill, .. }));
        assert_eq!(
            next(rx1).await,
            ServerMsg::MatchEnded {
                did_you_win: false,
                reason: EndReason::Victory
            }
        );
        assert_eq!(
            next(rx1).await,
            ServerMsg::MoveRejected {
                reason: MoveError::MatchNotActive
            }
        );
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn forced_skips_do_not_count_as_activity() {
        let mut h = start(Some(Duration::from_secs(10)), 100);
        let [rx0, rx1] = &mut h.rx;
        next(rx0).await;
        next(rx1).await;

        assert!(matches!(next(rx0).await, ServerMsg::MoveAccepted { forced: true, .. }));
        assert!(matches!(next(rx1).await, ServerMsg::OpponentMoved { forced: true, .. }));
        assert!(h.handle.idle_for(Instant::now()) >= Duration::from_secs(10));
    }
}
