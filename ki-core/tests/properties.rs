//! Property tests for the rule arithmetic and the parser.

use ki_core::combat::{effort_ki_delta, modifier_ki_cost};
use ki_core::racial::{majin_magic_gain, plan_regeneration, zenkai, RegenerationPlan};
use ki_core::{
    parse_modifiers, AbilityTag, BaseStats, ChannelId, Character, CombatBonusState,
    CombatSession, Effect, EffortLevel, ModifierSet, RacialTag, RulesConfig, SessionStatus,
};
use proptest::prelude::*;
use std::collections::HashMap;

fn character(base_pl: u64, endurance: u64, control: u64) -> Character {
    Character::new("Prop", "Test", BaseStats::new(base_pl, 10, 10, 10, endurance, control))
}

proptest! {
    /// Majin Magic ki gain is `floor(max_ki × min(final, H) / H)` and never overfills.
    #[test]
    fn majin_ki_gain_formula(
        endurance in 1u64..200,
        ki_percent in 0u64..=100,
        final_damage in 1u64..2_000_000,
        target_max_health in 1u64..1_000_000,
    ) {
        let config = RulesConfig::default();
        let base = character(1000, endurance, 10);
        let attacker = base.clone().with_ki(base.max_ki() * ki_percent / 100);
        let outcome = majin_magic_gain(&attacker, 0, final_damage, target_max_health, &config);

        let lost = final_damage.min(target_max_health) as u128;
        let expected = (attacker.max_ki() as u128 * lost / target_max_health as u128) as u64;
        prop_assert_eq!(outcome.ki_gain, expected);
        prop_assert!(outcome.new_ki <= attacker.max_ki());
        prop_assert_eq!(outcome.new_ki, (attacker.ki() + expected).min(attacker.max_ki()));
    }

    /// Repeated triggers never push the bonus past half of base PL.
    #[test]
    fn majin_bonus_is_capped(
        base_pl in 1u64..100_000,
        hits in proptest::collection::vec((1u64..50_000, 1u64..50_000), 1..20),
    ) {
        let config = RulesConfig::default();
        let attacker = character(base_pl, 10, 10);
        let cap = base_pl / 2;
        let mut bonus = 0;
        for (damage, health) in hits {
            let outcome = majin_magic_gain(&attacker, bonus, damage, health, &config);
            prop_assert_eq!(outcome.actual_gain, outcome.raw_gain.min(cap - bonus));
            prop_assert!(outcome.new_bonus <= cap);
            prop_assert_eq!(outcome.new_bonus, (bonus + outcome.raw_gain).min(cap));
            bonus = outcome.new_bonus;
        }
    }

    /// Zenkai adds exactly `floor(base_pl / 10)` when the opponent is stronger.
    #[test]
    fn zenkai_gain_is_exact(
        base_pl in 10u64..1_000_000,
        opponent_pl in 0u64..2_000_000,
        existing in 0u64..100_000,
    ) {
        let config = RulesConfig::default();
        let saiyan = character(base_pl, 10, 10).with_tag(RacialTag::new(AbilityTag::Zenkai));
        let bonus = CombatBonusState {
            zenkai_bonus: existing,
            majin_magic_bonus: 0,
            last_attacker_pl: opponent_pl,
        };
        let effects = zenkai(&saiyan, None, &bonus, &config);
        if opponent_pl > base_pl + existing {
            prop_assert_eq!(
                effects,
                vec![Effect::ZenkaiGained {
                    character: saiyan.id,
                    gain: base_pl / 10,
                    new_total: existing + base_pl / 10,
                }]
            );
        } else {
            prop_assert!(effects.is_empty());
        }
    }

    /// Regeneration never overheals, and enhanced mode never overspends ki.
    #[test]
    fn regeneration_stays_in_bounds(
        base_pl in 1u64..10_000,
        endurance in 1u64..100,
        control in 0u64..50,
        health_percent in 0u64..=100,
        ki_percent in 0u64..=100,
        enhanced in any::<bool>(),
    ) {
        let config = RulesConfig::default();
        let mut c = character(base_pl, endurance, control)
            .with_tag(RacialTag::new(AbilityTag::Regeneration));
        if enhanced {
            c = c.with_tag(RacialTag::active(AbilityTag::EnhancedRegeneration));
        }
        let c = c
            .clone()
            .with_health(c.max_health() * health_percent / 100)
            .with_ki(c.max_ki() * ki_percent / 100);

        match plan_regeneration(&c, None, &config) {
            RegenerationPlan::Idle => prop_assert!(c.health() >= c.max_health()),
            RegenerationPlan::Heal { healed, ki_cost, enhanced: was_enhanced } => {
                prop_assert!(c.health() + healed <= c.max_health());
                prop_assert!(ki_cost <= c.ki());
                prop_assert_eq!(was_enhanced, enhanced);
            }
            RegenerationPlan::Skipped { ki_needed, ki_available } => {
                prop_assert!(enhanced);
                prop_assert!(ki_needed > ki_available);
            }
        }
    }

    /// Ending a session zeroes bonuses, and doing it again changes nothing.
    #[test]
    fn clearing_bonuses_is_idempotent(
        bonuses in proptest::collection::vec((0u64..10_000, 0u64..10_000, 0u64..10_000), 1..6),
    ) {
        let ids: Vec<_> = bonuses.iter().map(|_| ki_core::CharacterId::new()).collect();
        let map: HashMap<_, _> = ids
            .iter()
            .zip(&bonuses)
            .map(|(id, (z, m, l))| {
                (*id, CombatBonusState { zenkai_bonus: *z, majin_magic_bonus: *m, last_attacker_pl: *l })
            })
            .collect();
        let mut session = CombatSession {
            channel: ChannelId(1),
            roster: ids.clone(),
            turn_index: 0,
            round: 1,
            bonuses: map,
            status: SessionStatus::Active,
        };
        let clear: Vec<Effect> = ids
            .iter()
            .map(|id| Effect::BonusesCleared { channel: ChannelId(1), character: *id })
            .collect();

        session.apply_bonus_effects(&clear);
        let once = session.clone();
        session.apply_bonus_effects(&clear);
        prop_assert_eq!(&once, &session);
        for id in &ids {
            prop_assert!(session.bonus(*id).is_clear());
        }
    }

    /// Parsing the same tokens twice gives the same result.
    #[test]
    fn parsing_is_deterministic(tokens in proptest::collection::vec("[aem@][a-z0-9+*/.-]{0,6}", 0..8)) {
        prop_assert_eq!(parse_modifiers(&tokens), parse_modifiers(&tokens));
    }

    /// Words that cannot be modifiers never fail to parse.
    #[test]
    fn unknown_tokens_pass_through(tokens in proptest::collection::vec("[b-dfg-ln-z@<#][a-z0-9]{0,10}", 0..8)) {
        let set = parse_modifiers(&tokens).unwrap();
        prop_assert!(set.modifiers().is_empty());
        prop_assert_eq!(set.passthrough().len(), tokens.len());
    }

    /// `a+N` always costs ki; `a*r` costs ki once r clears 1.
    #[test]
    fn ki_costed_modifiers_cost_ki(n in 1i64..1_000, control in 0u64..10_000, whole in 2u64..10) {
        let config = RulesConfig::default();
        let agility = ModifierSet::parse(&format!("a+{n}")).unwrap();
        prop_assert!(modifier_ki_cost(&agility, control, &config) >= 1);

        let accuracy = ModifierSet::parse(&format!("a*{whole}")).unwrap();
        prop_assert!(modifier_ki_cost(&accuracy, control, &config) >= 1);
    }

    /// Free modifiers never cost ki.
    #[test]
    fn free_modifiers_are_free(
        n in 0i64..1_000,
        whole in 1u64..10,
        control in 0u64..10_000,
    ) {
        let config = RulesConfig::default();
        let free = ModifierSet::parse(&format!("m+{n} m-{n} ma+{n} m*{whole} ma*{whole} a-{n} a/{whole}")).unwrap();
        prop_assert_eq!(modifier_ki_cost(&free, control, &config), 0);
        prop_assert_eq!(free.ki_agility(), -n);
    }

    /// Effort ki deltas follow the table sign and never exceed max ki.
    #[test]
    fn effort_delta_is_bounded(level in 1u8..=5, max_ki in 0u64..1_000_000) {
        let config = RulesConfig::default();
        let delta = effort_ki_delta(EffortLevel::new(level).unwrap(), max_ki, &config);
        prop_assert!(delta.unsigned_abs() <= max_ki);
        match level {
            1 => prop_assert!(delta >= 0),
            2 => prop_assert_eq!(delta, 0),
            _ => prop_assert!(delta <= 0),
        }
    }
}

#[test]
fn test_majin_cap_example() {
    // base_pl 1000, bonus 400 (cap 500), 25% of health lost
    let attacker = character(1000, 10, 10);
    let outcome = majin_magic_gain(&attacker, 400, 250, 1_000, &RulesConfig::default());
    assert_eq!(outcome.raw_gain, 250);
    assert_eq!(outcome.actual_gain, 100);
    assert_eq!(outcome.new_bonus, 500);
}
