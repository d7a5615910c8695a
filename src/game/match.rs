//! Match state machine - turn ownership, move legality, and resolution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::combat::{CombatRules, CombatSystem, MoveKind};

pub type MatchId = Uuid;
pub type ConnectionId = Uuid;

/// One of the two seats in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub const BOTH: [Slot; 2] = [Slot::First, Slot::Second];

    pub fn index(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }

    pub fn other(self) -> Slot {
        match self {
            Slot::First => Slot::Second,
            Slot::Second => Slot::First,
        }
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot.index() as u8
    }
}

impl TryFrom<u8> for Slot {
    type Error = InvalidSlot;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Slot::First),
            1 => Ok(Slot::Second),
            other => Err(InvalidSlot(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSlot(pub u8);

impl fmt::Display for InvalidSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {} is not 0 or 1", self.0)
    }
}

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Health reached zero
    Victory,
    /// Explicit surrender, or displaced by a newer match
    Forfeit,
    /// Loser's connection went away
    Disconnect,
    /// A forced skip or idle eviction cost the loser the match
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub winner: Slot,
    pub reason: EndReason,
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Active,
    Finished(MatchResult),
}

/// Rejection reasons; none of them mutate the match
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveError {
    #[error("not waiting or in a match")]
    NotInQueueOrMatch,
    #[error("match is not active")]
    MatchNotActive,
    #[error("not your turn")]
    NotYourTurn,
    #[error("not enough mana")]
    InsufficientResource,
    #[error("unknown move")]
    UnknownMove,
    #[error("special ability already used")]
    SpecialAlreadyUsed,
    #[error("moving too fast")]
    OnCooldown,
}

impl MoveError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            MoveError::NotInQueueOrMatch => "not_in_queue_or_match",
            MoveError::MatchNotActive => "match_not_active",
            MoveError::NotYourTurn => "not_your_turn",
            MoveError::InsufficientResource => "insufficient_resource",
            MoveError::UnknownMove => "unknown_move",
            MoveError::SpecialAlreadyUsed => "special_already_used",
            MoveError::OnCooldown => "on_cooldown",
        }
    }
}

/// Player state in a match (authoritative)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub health: u32,
    pub max_health: u32,
    pub mana: u32,
    pub max_mana: u32,
    /// Set by defend, cleared when this player's next turn starts
    pub defending: bool,
    /// Remaining ticks of this player's damage-over-time effect
    pub special_active: u32,
    pub special_used: bool,
    pub last_action: Option<Instant>,
}

impl PlayerState {
    pub fn new(max_health: u32, rules: &CombatRules) -> Self {
        Self {
            health: max_health,
            max_health,
            mana: rules.starting_mana.min(rules.max_mana),
            max_mana: rules.max_mana,
            defending: false,
            special_active: 0,
            special_used: false,
            last_action: None,
        }
    }

    /// Take damage, returns the amount actually removed
    fn take_damage(&mut self, damage: u32) -> u32 {
        let before = self.health;
        let (health, _) = CombatSystem::apply_damage(self.health, damage);
        self.health = health;
        before - health
    }

    fn heal(&mut self, amount: u32) -> u32 {
        let before = self.health;
        self.health = CombatSystem::restore(self.health, amount, self.max_health);
        self.health - before
    }

    fn restore_mana(&mut self, amount: u32) -> u32 {
        let before = self.mana;
        self.mana = CombatSystem::restore(self.mana, amount, self.max_mana);
        self.mana - before
    }

    fn clamp(&mut self) {
        self.health = self.health.min(self.max_health);
        self.mana = self.mana.min(self.max_mana);
    }

    pub fn is_dead(&self) -> bool {
        self.health == 0
    }
}

/// One damage-over-time tick resolved at the start of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectTick {
    /// Whose effect fired; the damage lands on the other slot
    pub owner: Slot,
    pub damage: u32,
    pub turns_remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue { next_turn: Slot },
    Finished(MatchResult),
}

/// Everything an accepted move changed, for fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub actor: Slot,
    pub kind: MoveKind,
    /// Applied by the turn timer rather than the player
    pub forced: bool,
    pub description: String,
    pub ticks: Vec<EffectTick>,
    pub outcome: Outcome,
}

/// A single two-player battle
#[derive(Debug, Clone)]
pub struct Match {
    pub id: MatchId,
    pub players: [ConnectionId; 2],
    states: [PlayerState; 2],
    turn: Slot,
    turn_count: u32,
    phase: MatchPhase,
    last_activity: Instant,
    rules: CombatRules,
    move_cooldown: Duration,
}

impl Match {
    pub fn new(
        id: MatchId,
        players: [ConnectionId; 2],
        rules: CombatRules,
        max_health: u32,
        now: Instant,
    ) -> Self {
        Self {
            id,
            players,
            states: [
                PlayerState::new(max_health, &rules),
                PlayerState::new(max_health, &rules),
            ],
            turn: Slot::First,
            turn_count: 1,
            phase: MatchPhase::Active,
            last_activity: now,
            rules,
            move_cooldown: Duration::ZERO,
        }
    }

    pub fn with_move_cooldown(mut self, cooldown: Duration) -> Self {
        self.move_cooldown = cooldown;
        self
    }

    pub fn state(&self, slot: Slot) -> &PlayerState {
        &self.states[slot.index()]
    }

    pub fn turn(&self) -> Slot {
        self.turn
    }

    pub fn turn_count(&self) -> u32 {
        self.turn_count
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == MatchPhase::Active
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Apply a move submitted by `slot`
    pub fn apply(&mut self, slot: Slot, kind: MoveKind, now: Instant) -> Result<Resolution, MoveError> {
        self.resolve(slot, kind, now, false)
    }

    /// Apply a move given as its wire name
    pub fn apply_named(&mut self, slot: Slot, name: &str, now: Instant) -> Result<Resolution, MoveError> {
        match name.parse::<MoveKind>() {
            Ok(kind) => self.apply(slot, kind, now),
            Err(_) => {
                self.ensure_active()?;
                self.ensure_turn(slot)?;
                Err(MoveError::UnknownMove)
            }
        }
    }

    /// Skip on behalf of whoever holds the turn
    pub fn force_skip(&mut self, now: Instant) -> Result<Resolution, MoveError> {
        self.resolve(self.turn, MoveKind::Skip, now, true)
    }

    /// End the match with `loser` forfeiting; None if already finished
    pub fn forfeit(&mut self, loser: Slot, reason: EndReason) -> Option<MatchResult> {
        if !self.is_active() {
            return None;
        }
        let result = MatchResult {
            winner: loser.other(),
            reason,
        };
        self.phase = MatchPhase::Finished(result);
        Some(result)
    }

    fn ensure_active(&self) -> Result<(), MoveError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(MoveError::MatchNotActive)
        }
    }

    fn ensure_turn(&self, slot: Slot) -> Result<(), MoveError> {
        if slot == self.turn {
            Ok(())
        } else {
            Err(MoveError::NotYourTurn)
        }
    }

    fn ensure_legal(&self, slot: Slot, kind: MoveKind, now: Instant) -> Result<(), MoveError> {
        let me = self.state(slot);

        if kind != MoveKind::Skip && !self.move_cooldown.is_zero() {
            if let Some(last) = me.last_action {
                if now.saturating_duration_since(last) < self.move_cooldown {
                    return Err(MoveError::OnCooldown);
                }
            }
        }

        if kind == MoveKind::Special && me.special_used {
            return Err(MoveError::SpecialAlreadyUsed);
        }
        if me.mana < self.rules.cost(kind) {
            return Err(MoveError::InsufficientResource);
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        slot: Slot,
        kind: MoveKind,
        now: Instant,
        forced: bool,
    ) -> Result<Resolution, MoveError> {
        self.ensure_active()?;

        if kind == MoveKind::Surrender {
            let result = MatchResult {
                winner: slot.other(),
                reason: EndReason::Forfeit,
            };
            self.phase = MatchPhase::Finished(result);
            self.last_activity = now;
            return Ok(Resolution {
                actor: slot,
                kind,
                forced,
                description: "surrendered".to_string(),
                ticks: Vec::new(),
                outcome: Outcome::Finished(result),
            });
        }

        self.ensure_turn(slot)?;
        self.ensure_legal(slot, kind, now)?;

        // Resolve on a copy and commit in one assignment below
        let mut states = self.states.clone();
        states[slot.index()].defending = false;
        let ticks = tick_effects(&mut states, &self.rules);

        let (description, winner) = match decide_winner(&states, slot) {
            Some(winner) => ("was overwhelmed".to_string(), Some(winner)),
            None => {
                let description = self.apply_effect(&mut states, slot, kind);
                for state in states.iter_mut() {
                    state.clamp();
                }
                (description, decide_winner(&states, slot))
            }
        };
        states[slot.index()].last_action = Some(now);

        let outcome = match winner {
            Some(winner) => {
                let reason = if forced && winner != slot {
                    EndReason::Timeout
                } else {
                    EndReason::Victory
                };
                Outcome::Finished(MatchResult { winner, reason })
            }
            None => Outcome::Continue {
                next_turn: slot.other(),
            },
        };

        self.states = states;
        self.last_activity = now;
        match outcome {
            Outcome::Finished(result) => self.phase = MatchPhase::Finished(result),
            Outcome::Continue { next_turn } => {
                self.turn = next_turn;
                self.turn_count += 1;
            }
        }

        Ok(Resolution {
            actor: slot,
            kind,
            forced,
            description,
            ticks,
            outcome,
        })
    }

    /// Mana cost first, then the primary effect
    fn apply_effect(&self, states: &mut [PlayerState; 2], slot: Slot, kind: MoveKind) -> String {
        let rules = &self.rules;
        let [first, second] = states;
        let (me, enemy) = match slot {
            Slot::First => (first, second),
            Slot::Second => (second, first),
        };
        me.mana -= rules.cost(kind);

        match kind {
            MoveKind::Attack => {
                let damage = CombatSystem::mitigated(rules.attack_damage, enemy.defending);
                format!("dealt {} damage", enemy.take_damage(damage))
            }
            MoveKind::Defend => {
                me.defending = true;
                format!("restored {} health", me.heal(rules.defend_heal))
            }
            MoveKind::Skill => {
                let damage = CombatSystem::mitigated(rules.skill_damage(), enemy.defending);
                format!("dealt {} damage", enemy.take_damage(damage))
            }
            MoveKind::Mana => format!("restored {} mana", me.restore_mana(rules.mana_restore)),
            MoveKind::Special => {
                me.special_used = true;
                me.special_active = rules.special_duration;
                format!("cast special for {} damage", enemy.take_damage(rules.special_burst))
            }
            MoveKind::Skip => "skipped".to_string(),
            MoveKind::Surrender => "surrendered".to_string(),
        }
    }
}

/// Fire every running damage-over-time effect once
fn tick_effects(states: &mut [PlayerState; 2], rules: &CombatRules) -> Vec<EffectTick> {
    let mut ticks = Vec::new();
    for owner in Slot::BOTH {
        if states[owner.index()].special_active == 0 {
            continue;
        }
        let damage = states[owner.other().index()].take_damage(rules.special_tick_damage);
        let caster = &mut states[owner.index()];
        caster.special_active -= 1;
        ticks.push(EffectTick {
            owner,
            damage,
            turns_remaining: caster.special_active,
        });
    }
    ticks
}

/// The opponent dying takes precedence over the actor dying
fn decide_winner(states: &[PlayerState; 2], actor: Slot) -> Option<Slot> {
    if states[actor.other().index()].is_dead() {
        Some(actor)
    } else if states[actor.index()].is_dead() {
        Some(actor.other())
    } else {
        None
    }
}
