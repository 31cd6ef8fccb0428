//! Testing utilities for the combat engine.
//!
//! This module provides tools for integration testing:
//! - Sample characters for each racial ability
//! - `TestHarness` for scripted combat scenarios with deterministic rolls
//! - Assertion helpers for reading back persisted state

use crate::character::{AbilityTag, BaseStats, Character, CharacterId, ChannelId, RacialTag};
use crate::config::RulesConfig;
use crate::engine::{ActionRequest, CombatEngine, Outcome};
use crate::persist::{CombatStore, MemoryStore};
use crate::roll::{FixedRolls, RollSource};
use crate::rules::{EngineError, Resolution};
use crate::session::CombatBonusState;

/// PL 1000, all attributes 10. Max health 10_000, max ki 100.
pub fn sample_fighter(name: &str) -> Character {
    Character::new(name, "Human", BaseStats::new(1000, 10, 10, 10, 10, 10))
}

/// A sample fighter with Zenkai.
pub fn sample_saiyan(name: &str) -> Character {
    let mut character = sample_fighter(name).with_tag(RacialTag::new(AbilityTag::Zenkai));
    character.race = "Saiyan".to_string();
    character
}

/// A sample fighter with Majin Magic.
pub fn sample_majin(name: &str) -> Character {
    let mut character = sample_fighter(name).with_tag(RacialTag::new(AbilityTag::MajinMagic));
    character.race = "Majin".to_string();
    character
}

/// A sample fighter with Regeneration and the (inactive) enhancement.
pub fn sample_namekian(name: &str) -> Character {
    let mut character = sample_fighter(name)
        .with_tag(RacialTag::new(AbilityTag::Regeneration))
        .with_tag(RacialTag::new(AbilityTag::EnhancedRegeneration));
    character.race = "Namekian".to_string();
    character
}

/// Test harness for running combat scenarios in one channel.
pub struct TestHarness {
    /// The engine under test.
    pub engine: CombatEngine<MemoryStore>,
    /// Channel every helper acts on.
    pub channel: ChannelId,
}

impl TestHarness {
    /// Create a harness over `characters` with exact rolls (every roll equals its stat).
    pub fn new(characters: impl IntoIterator<Item = Character>) -> Self {
        Self::with_rolls(characters, FixedRolls::exact())
    }

    /// Create a harness with a custom roll source.
    pub fn with_rolls(
        characters: impl IntoIterator<Item = Character>,
        rolls: impl RollSource + 'static,
    ) -> Self {
        let mut store = MemoryStore::new();
        for character in characters {
            store.insert_character(character);
        }
        let engine = CombatEngine::new(store, RulesConfig::default()).with_rolls(rolls);
        Self {
            engine,
            channel: ChannelId(1),
        }
    }

    /// Start combat with the given turn order.
    pub fn start(&mut self, roster: &[CharacterId]) -> Result<Resolution, EngineError> {
        self.engine.start_session(self.channel, roster.to_vec())
    }

    /// A physical attack with attacker modifier tokens; the defender takes it.
    pub fn attack(
        &mut self,
        actor: CharacterId,
        target: CharacterId,
        args: &str,
    ) -> Result<Outcome, EngineError> {
        self.engine
            .resolve_action(ActionRequest::new(self.channel, actor, target).with_tokens(args))
    }

    /// Resolve a fully specified request in the harness channel.
    pub fn act(&mut self, request: ActionRequest) -> Result<Outcome, EngineError> {
        self.engine.resolve_action(ActionRequest {
            channel: self.channel,
            ..request
        })
    }

    pub fn advance(&mut self) -> Result<Resolution, EngineError> {
        self.engine.advance_turn(self.channel)
    }

    pub fn end(&mut self) -> Result<Resolution, EngineError> {
        self.engine.end_session(self.channel)
    }

    /// The persisted row for a character.
    pub fn character(&self, id: CharacterId) -> Option<Character> {
        self.engine.store().get_character(id).ok()
    }

    /// Persisted current health, or 0 for an unknown character.
    pub fn health(&self, id: CharacterId) -> u64 {
        self.character(id).map(|c| c.health()).unwrap_or(0)
    }

    /// Persisted current ki, or 0 for an unknown character.
    pub fn ki(&self, id: CharacterId) -> u64 {
        self.character(id).map(|c| c.ki()).unwrap_or(0)
    }

    /// Session bonus state, or zeroed when no session holds the character.
    pub fn bonus(&self, id: CharacterId) -> CombatBonusState {
        self.engine
            .session(self.channel)
            .map(|s| s.bonus(id))
            .unwrap_or_default()
    }

    /// Bonus state as persisted in the store.
    pub fn stored_bonus(&self, id: CharacterId) -> CombatBonusState {
        self.engine
            .store()
            .get_combat_bonus_state(self.channel, id)
            .unwrap_or_default()
    }

    pub fn in_combat(&self) -> bool {
        self.engine.session(self.channel).is_some()
    }

    pub fn current_actor(&self) -> Option<CharacterId> {
        self.engine
            .session(self.channel)
            .and_then(|s| s.current_actor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_round_trip() {
        let goku = sample_saiyan("Goku");
        let buu = sample_majin("Buu");
        let mut harness = TestHarness::new([goku.clone(), buu.clone()]);

        harness.start(&[goku.id, buu.id]).unwrap();
        assert!(harness.in_combat());
        assert_eq!(harness.current_actor(), Some(goku.id));

        let outcome = harness.attack(goku.id, buu.id, "").unwrap();
        assert_eq!(outcome.final_damage, 1000);
        assert_eq!(harness.health(buu.id), 9_000);

        harness.advance().unwrap();
        assert_eq!(harness.current_actor(), Some(buu.id));

        harness.end().unwrap();
        assert!(!harness.in_combat());
        assert!(harness.stored_bonus(buu.id).is_clear());
    }

    #[test]
    fn test_sample_tags() {
        assert!(sample_saiyan("a").has_ability(&AbilityTag::Zenkai));
        assert!(sample_majin("b").has_ability(&AbilityTag::MajinMagic));
        let namekian = sample_namekian("c");
        assert!(namekian.has_ability(&AbilityTag::Regeneration));
        assert!(!namekian.ability_active(&AbilityTag::EnhancedRegeneration));
    }
}
