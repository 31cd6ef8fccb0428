//! Effect descriptors and the engine error taxonomy.
//!
//! Rules never mutate state. Each rule returns a [`Resolution`]: a list of
//! [`Effect`]s describing what should change, plus a short narrative line.
//! The engine validates first, resolves second, and only then applies the
//! effects through [`apply_effects`] and the session's bonus bookkeeping.
//! A resolution is therefore either committed whole or not at all.

use crate::character::{Character, CharacterId, ChannelId};
use crate::modifiers::ParseError;
use crate::persist::StoreError;
use crate::roll::RollKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to the command layer. None of them are fatal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("{character} needs {needed} {resource} but has {available}")]
    InsufficientResource {
        character: String,
        resource: &'static str,
        needed: u64,
        available: u64,
    },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Session error: {0}")]
    SessionState(String),

    #[error("{character} does not have the {ability} ability")]
    AbilityNotLearned { character: String, ability: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a ki delta happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KiReason {
    /// `a±` / `a*` costs.
    Modifiers,
    /// Effort level cost or recovery.
    Effort,
    MajinMagic,
    Regeneration,
}

/// A state change or notable event produced by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// A roll was made
    RollMade {
        character: CharacterId,
        kind: RollKind,
        stat: u64,
        result: u64,
    },

    /// The accuracy contest succeeded
    AttackHit {
        attacker: CharacterId,
        target: CharacterId,
        accuracy: u64,
        evasion: Option<u64>,
    },

    /// The defender evaded
    AttackMissed {
        attacker: CharacterId,
        target: CharacterId,
        accuracy: u64,
        evasion: u64,
    },

    /// Damage computed for a landed attack
    DamageDealt {
        attacker: CharacterId,
        target: CharacterId,
        raw: u64,
        blocked: u64,
        final_damage: u64,
    },

    /// Health changed (damage or healing)
    HealthChanged {
        character: CharacterId,
        amount: i64,
        new_current: u64,
        max: u64,
        defeated: bool,
    },

    /// Ki changed (cost or gain)
    KiChanged {
        character: CharacterId,
        amount: i64,
        new_current: u64,
        max: u64,
        reason: KiReason,
    },

    /// Zenkai accrued this turn
    ZenkaiGained {
        character: CharacterId,
        gain: u64,
        new_total: u64,
    },

    /// Majin Magic fired after dealing damage
    MajinMagicTriggered {
        character: CharacterId,
        ki_gain: u64,
        raw_gain: u64,
        actual_gain: u64,
        new_bonus: u64,
    },

    /// End-of-turn regeneration healed the character
    Regenerated {
        character: CharacterId,
        healed: u64,
        ki_cost: u64,
        enhanced: bool,
    },

    /// Enhanced regeneration could not be paid for this turn
    RegenerationSkipped {
        character: CharacterId,
        ki_needed: u64,
        ki_available: u64,
    },

    /// The effective PL of the opponent a character just damaged was recorded
    OpponentRecorded {
        character: CharacterId,
        opponent_pl: u64,
    },

    /// Enhanced regeneration was switched on or off
    EnhancedRegenerationToggled { character: CharacterId, active: bool },

    /// Combat started in a channel
    SessionStarted {
        channel: ChannelId,
        roster: Vec<CharacterId>,
    },

    ParticipantAdded {
        channel: ChannelId,
        character: CharacterId,
    },

    ParticipantRemoved {
        channel: ChannelId,
        character: CharacterId,
    },

    /// Turn advanced in combat
    TurnAdvanced {
        channel: ChannelId,
        round: u32,
        completed: CharacterId,
        next: CharacterId,
    },

    /// Session bonuses were reset for a character
    BonusesCleared {
        channel: ChannelId,
        character: CharacterId,
    },

    /// Combat ended
    SessionEnded { channel: ChannelId, rounds: u32 },
}

impl Effect {
    /// The character whose persisted row this effect changes, if any.
    pub fn touches_character(&self) -> Option<CharacterId> {
        match self {
            Effect::HealthChanged { character, .. }
            | Effect::KiChanged { character, .. }
            | Effect::EnhancedRegenerationToggled { character, .. } => Some(*character),
            _ => None,
        }
    }
}

/// The result of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub effects: Vec<Effect>,
    pub narrative: String,
}

impl Resolution {
    pub fn new(narrative: impl Into<String>) -> Self {
        Self {
            effects: Vec::new(),
            narrative: narrative.into(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// Sum of health lost by `character` in this resolution.
    pub fn damage_taken(&self, character: CharacterId) -> u64 {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::HealthChanged {
                    character: c,
                    amount,
                    ..
                } if *c == character && *amount < 0 => Some(amount.unsigned_abs()),
                _ => None,
            })
            .sum()
    }
}

/// Apply effects to a set of character snapshots.
pub fn apply_effects(characters: &mut [Character], effects: &[Effect]) {
    for effect in effects {
        if let Some(id) = effect.touches_character() {
            if let Some(character) = characters.iter_mut().find(|c| c.id == id) {
                apply_effect(character, effect);
            }
        }
    }
}

/// Apply a single effect to one character snapshot.
///
/// Effects carry absolute values, so applying the same descriptor twice
/// leaves the character unchanged.
pub fn apply_effect(character: &mut Character, effect: &Effect) {
    match effect {
        Effect::HealthChanged { new_current, .. } => {
            character.set_health(*new_current);
        }
        Effect::KiChanged { new_current, .. } => {
            character.set_ki(*new_current);
        }
        Effect::EnhancedRegenerationToggled { active, .. } => {
            if let Some(tag) =
                character.tag_mut(&crate::character::AbilityTag::EnhancedRegeneration)
            {
                tag.is_active = *active;
            }
        }
        // Bonus effects belong to the session; the rest are informational.
        _ => {}
    }
}
