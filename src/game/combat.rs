//! Combat rules - move kinds, costs, and damage arithmetic

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every move a player can submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    /// Basic hit, halved against a defending target
    Attack,
    /// Small heal plus damage mitigation until the player's next turn
    Defend,
    /// Heavy hit, halved against a defending target
    Skill,
    /// Restore mana
    Mana,
    /// Once-per-match burst plus damage over time
    Special,
    /// Pass the turn (also forced by the turn timer)
    Skip,
    /// Concede the match, accepted out of turn
    Surrender,
}

impl MoveKind {
    pub const ALL: [MoveKind; 7] = [
        MoveKind::Attack,
        MoveKind::Defend,
        MoveKind::Skill,
        MoveKind::Mana,
        MoveKind::Special,
        MoveKind::Skip,
        MoveKind::Surrender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoveKind::Attack => "attack",
            MoveKind::Defend => "defend",
            MoveKind::Skill => "skill",
            MoveKind::Mana => "mana",
            MoveKind::Special => "special",
            MoveKind::Skip => "skip",
            MoveKind::Surrender => "surrender",
        }
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMoveKind(pub String);

impl FromStr for MoveKind {
    type Err = UnknownMoveKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoveKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownMoveKind(s.to_string()))
    }
}

/// Numeric tuning for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatRules {
    pub max_mana: u32,
    pub starting_mana: u32,

    pub attack_cost: u32,
    pub attack_damage: u32,

    pub defend_cost: u32,
    pub defend_heal: u32,

    pub skill_cost: u32,
    /// Skill hits for this multiple of `attack_damage`
    pub skill_multiplier: u32,

    pub mana_restore: u32,

    pub special_cost: u32,
    pub special_burst: u32,
    pub special_tick_damage: u32,
    pub special_duration: u32,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            max_mana: 50,
            starting_mana: 50,
            attack_cost: 10,
            attack_damage: 15,
            defend_cost: 5,
            defend_heal: 10,
            skill_cost: 20,
            skill_multiplier: 2,
            mana_restore: 15,
            special_cost: 30,
            special_burst: 10,
            special_tick_damage: 8,
            special_duration: 4,
        }
    }
}

impl CombatRules {
    /// Mana a move costs before it resolves
    pub fn cost(&self, kind: MoveKind) -> u32 {
        match kind {
            MoveKind::Attack => self.attack_cost,
            MoveKind::Defend => self.defend_cost,
            MoveKind::Skill => self.skill_cost,
            MoveKind::Special => self.special_cost,
            MoveKind::Mana | MoveKind::Skip | MoveKind::Surrender => 0,
        }
    }

    pub fn skill_damage(&self) -> u32 {
        self.attack_damage * self.skill_multiplier
    }
}

/// Damage arithmetic, integer only
pub struct CombatSystem;

impl CombatSystem {
    /// Damage after the defender's mitigation; halving floors
    pub fn mitigated(damage: u32, defending: bool) -> u32 {
        if defending {
            damage / 2
        } else {
            damage
        }
    }

    /// Apply damage to health, returns (new_health, is_dead)
    pub fn apply_damage(current_health: u32, damage: u32) -> (u32, bool) {
        let new_health = current_health.saturating_sub(damage);
        (new_health, new_health == 0)
    }

    /// Restore up to `max`
    pub fn restore(current: u32, amount: u32, max: u32) -> u32 {
        current.saturating_add(amount).min(max)
    }
}
