//! Registry of running matches, keyed by match id

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::matchmaking::{Association, ConnectionRegistry};

use super::combat::CombatRules;
use super::r#match::{ConnectionId, EndReason, Match, MatchId, Slot};
use super::runner::{GameMatch, MatchCommand, MatchHandle};
use super::timer::TurnTimer;

pub struct MatchRegistry {
    matches: DashMap<MatchId, MatchHandle>,
    connections: Arc<ConnectionRegistry>,
    config: GameConfig,
    rules: CombatRules,
}

impl MatchRegistry {
    pub fn new(connections: Arc<ConnectionRegistry>, config: GameConfig) -> Self {
        Self {
            matches: DashMap::new(),
            connections,
            config,
            rules: CombatRules::default(),
        }
    }

    /// Create a match with `first` in slot 0 and `second` in slot 1 and spawn its executor
    pub fn create(self: &Arc<Self>, first: ConnectionId, second: ConnectionId) -> MatchId {
        let players = [first, second];
        for connection_id in players {
            self.displace(connection_id);
        }

        let match_id = Uuid::new_v4();
        let seed = rand::random::<u64>();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let max_health = rng.gen_range(self.config.health_min..=self.config.health_max);

        let game = Match::new(match_id, players, self.rules, max_health, Instant::now())
            .with_move_cooldown(self.config.move_cooldown);
        let (game_match, handle) = GameMatch::new(
            game,
            TurnTimer::new(self.config.turn_timeout),
            self.connections.clone(),
            self.config.chat_max_len,
        );
        self.matches.insert(match_id, handle.clone());

        info!(
            match_id = %match_id,
            seed,
            max_health,
            slot0 = %first,
            slot1 = %second,
            "Created new match"
        );

        // A seat whose connection vanished before binding forfeits at once
        let bound = Slot::BOTH.map(|slot| self.connections.bind(players[slot.index()], match_id, slot));
        if let Some(gone) = Slot::BOTH.into_iter().find(|slot| !bound[slot.index()]) {
            warn!(match_id = %match_id, slot = u8::from(gone), "Connection gone before match start");
            if let Some(handle) = self.remove(&match_id) {
                let _ = handle.try_send(MatchCommand::Forfeit {
                    slot: gone,
                    reason: EndReason::Disconnect,
                });
            }
        }

        let registry = self.clone();
        tokio::spawn(async move {
            game_match.run().await;

            // Cleanup after match ends
            registry.remove(&match_id);
            info!(match_id = %match_id, "Match removed from registry");
        });

        match_id
    }

    /// Force any match `connection_id` is still bound to into a forfeit
    fn displace(&self, connection_id: ConnectionId) {
        if let Some(Association::InMatch { match_id, slot }) = self.connections.association(connection_id) {
            if let Some(previous) = self.remove(&match_id) {
                warn!(
                    match_id = %match_id,
                    connection_id = %connection_id,
                    "Connection rebound, forfeiting previous match"
                );
                let _ = previous.try_send(MatchCommand::Forfeit {
                    slot,
                    reason: EndReason::Forfeit,
                });
            }
        }
    }

    pub fn get(&self, id: &MatchId) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn find_by_connection(&self, connection_id: ConnectionId) -> Option<(MatchHandle, Slot)> {
        match self.connections.association(connection_id)? {
            Association::InMatch { match_id, slot } => self.get(&match_id).map(|h| (h, slot)),
            _ => None,
        }
    }

    /// Remove a match and unbind its participants; idempotent
    pub fn remove(&self, id: &MatchId) -> Option<MatchHandle> {
        let (_, handle) = self.matches.remove(id)?;
        for connection_id in handle.players {
            self.connections.release(connection_id, *id);
        }
        Some(handle)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    /// Evict idle matches and collect handles whose executor already exited
    pub fn sweep(&self, now: Instant) -> usize {
        // Collect first; removing while iterating would deadlock the shard
        let (closed, idle): (Vec<MatchHandle>, Vec<MatchHandle>) = self
            .matches
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|h| h.is_closed() || h.idle_for(now) >= self.config.match_idle)
            .partition(|h| h.is_closed());

        for handle in &closed {
            self.remove(&handle.id);
        }
        for handle in &idle {
            if handle.try_send(MatchCommand::Evict).is_err() {
                self.remove(&handle.id);
            }
        }

        let swept = closed.len() + idle.len();
        if swept > 0 {
            info!(closed = closed.len(), idle = idle.len(), "Swept matches");
        }
        swept
    }

    /// Periodic idle sweeping
    pub async fn run_sweeper(self: Arc<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            self.sweep(Instant::now());
        }
    }
}
