//! End-to-end exchanges through the combat engine.
//!
//! Every test uses exact rolls (each roll equals its backing stat) or a
//! scripted sequence, so damage numbers are fully determined:
//! `damage = main_stat × effective_pl / 10`, adjusted by effort and modifiers.

use ki_core::testing::{sample_fighter, sample_majin, TestHarness};
use ki_core::{
    ActionKind, ActionRequest, BaseStats, ChannelId, Character, Effect, EngineError, Form,
    KiReason, Ratio, Response, ScriptedRolls, Technique,
};

fn tank(name: &str) -> Character {
    // max health 4_000
    Character::new(name, "Android", BaseStats::new(400, 10, 10, 10, 10, 10))
}

#[test]
fn test_basic_hit_persists_damage() {
    let goku = sample_fighter("Goku");
    let vegeta = sample_fighter("Vegeta");
    let mut harness = TestHarness::new([goku.clone(), vegeta.clone()]);
    harness.start(&[goku.id, vegeta.id]).unwrap();

    let outcome = harness.attack(goku.id, vegeta.id, "").unwrap();
    assert!(outcome.hit);
    assert_eq!(outcome.final_damage, 1000);
    assert_eq!(harness.health(vegeta.id), 9_000);
    assert_eq!(harness.health(goku.id), 10_000);
}

#[test]
fn test_majin_magic_caps_bonus_over_repeated_hits() {
    let buu = sample_majin("Buu");
    let target = tank("Sixteen");
    let mut harness = TestHarness::new([buu.clone(), target.clone()]);
    harness.start(&[buu.id, target.id]).unwrap();

    // 1000 damage of 4000: 25% → raw 250
    harness.attack(buu.id, target.id, "").unwrap();
    assert_eq!(harness.bonus(buu.id).majin_magic_bonus, 250);
    harness.advance().unwrap();
    harness.advance().unwrap();

    // PL 1250 → 1250 damage → raw 312, only 250 fits under the 500 cap
    let outcome = harness.attack(buu.id, target.id, "").unwrap();
    assert_eq!(outcome.final_damage, 1250);
    assert!(outcome.effects.iter().any(|e| matches!(
        e,
        Effect::MajinMagicTriggered {
            raw_gain: 312,
            actual_gain: 250,
            new_bonus: 500,
            ..
        }
    )));
    harness.advance().unwrap();
    harness.advance().unwrap();

    let outcome = harness.attack(buu.id, target.id, "").unwrap();
    assert_eq!(outcome.final_damage, 1500);
    assert_eq!(harness.bonus(buu.id).majin_magic_bonus, 500);
    assert_eq!(harness.stored_bonus(buu.id).majin_magic_bonus, 500);
    assert_eq!(harness.health(target.id), 250);
}

#[test]
fn test_majin_magic_ki_gain_is_permanent() {
    let buu = sample_majin("Buu").with_ki(50);
    let target = sample_fighter("Gohan");
    let mut harness = TestHarness::new([buu.clone(), target.clone()]);
    harness.start(&[buu.id, target.id]).unwrap();

    // half ki: PL 500, 500 damage = 5% of 10_000 → +5 ki
    harness.attack(buu.id, target.id, "").unwrap();
    assert_eq!(harness.ki(buu.id), 55);

    harness.end().unwrap();
    assert_eq!(harness.ki(buu.id), 55);
    assert_eq!(harness.bonus(buu.id).majin_magic_bonus, 0);
}

#[test]
fn test_dodge_miss_still_costs_ki() {
    let goku = sample_fighter("Goku");
    let vegeta = sample_fighter("Vegeta");
    // accuracy 5 against evasion 50
    let mut harness =
        TestHarness::with_rolls([goku.clone(), vegeta.clone()], ScriptedRolls::new([5, 50]));
    harness.start(&[goku.id, vegeta.id]).unwrap();

    let outcome = harness
        .act(
            ActionRequest::new(ChannelId(1), goku.id, vegeta.id)
                .with_tokens("a+2")
                .with_response(Response::Dodge, ""),
        )
        .unwrap();
    assert!(!outcome.hit);
    assert_eq!(outcome.final_damage, 0);
    assert_eq!(harness.health(vegeta.id), 10_000);
    // a+2 at control 10 costs 20
    assert_eq!(harness.ki(goku.id), 80);
}

#[test]
fn test_block_with_defender_modifiers() {
    let goku = sample_fighter("Goku");
    let piccolo = sample_fighter("Piccolo");
    let mut harness = TestHarness::new([goku.clone(), piccolo.clone()]);
    harness.start(&[goku.id, piccolo.id]).unwrap();

    // raw 1000; defense 10 at e3 (×5/4) blocks 1250 → fully blocked
    let outcome = harness
        .act(
            ActionRequest::new(ChannelId(1), goku.id, piccolo.id)
                .with_response(Response::Block, "e3"),
        )
        .unwrap();
    assert!(outcome.hit);
    assert_eq!(outcome.final_damage, 0);
    // e3 costs the defender 5% of max ki
    assert_eq!(harness.ki(piccolo.id), 95);
    assert_eq!(harness.health(piccolo.id), 10_000);
}

#[test]
fn test_ki_attack_uses_control_and_technique() {
    let goku = sample_fighter("Goku");
    let cell = sample_fighter("Cell");
    let mut harness = TestHarness::new([goku.clone(), cell.clone()]);
    harness.start(&[goku.id, cell.id]).unwrap();

    // control 10 + 10 = 20, counter ×4/5 = 16 → 1600
    let outcome = harness
        .act(
            ActionRequest::new(ChannelId(1), goku.id, cell.id)
                .with_kind(ActionKind::Ki)
                .with_technique(Technique::Counter)
                .with_tokens("m+10"),
        )
        .unwrap();
    assert_eq!(outcome.final_damage, 1600);
    // free modifiers never touch ki
    assert_eq!(harness.ki(goku.id), 100);
}

#[test]
fn test_low_effort_restores_ki() {
    let goku = sample_fighter("Goku").with_ki(50);
    let vegeta = sample_fighter("Vegeta");
    let mut harness = TestHarness::new([goku.clone(), vegeta.clone()]);
    harness.start(&[goku.id, vegeta.id]).unwrap();

    // PL 500 → 500 × 3/4 = 375
    let outcome = harness.attack(goku.id, vegeta.id, "e1").unwrap();
    assert_eq!(outcome.final_damage, 375);
    assert_eq!(harness.ki(goku.id), 53);
    assert!(outcome.effects.iter().any(|e| matches!(
        e,
        Effect::KiChanged {
            amount: 3,
            reason: KiReason::Effort,
            ..
        }
    )));
}

#[test]
fn test_active_form_scales_damage() {
    let goku = sample_fighter("Goku").with_form("Super Saiyan");
    let vegeta = sample_fighter("Vegeta");
    let mut harness = TestHarness::new([goku.clone(), vegeta.clone()]);
    harness.engine.store_mut().insert_form(
        Form::new("Super Saiyan")
            .with_pl(Ratio::whole(2))
            .with_attribute(ki_core::Attribute::Strength, Ratio::new(3, 2).unwrap()),
    );
    harness.start(&[goku.id, vegeta.id]).unwrap();

    // strength 15 × PL 2000 / 10
    let outcome = harness.attack(goku.id, vegeta.id, "").unwrap();
    assert_eq!(outcome.final_damage, 3000);

    let stats = harness
        .engine
        .effective_stats(ChannelId(1), goku.id)
        .unwrap();
    assert_eq!(stats.effective_pl, 2000);
}

#[test]
fn test_insufficient_ki_changes_nothing() {
    let goku = sample_fighter("Goku").with_ki(15);
    let vegeta = sample_fighter("Vegeta");
    let mut harness = TestHarness::new([goku.clone(), vegeta.clone()]);
    harness.start(&[goku.id, vegeta.id]).unwrap();
    let before = harness.engine.session(ChannelId(1)).unwrap().clone();

    let err = harness.attack(goku.id, vegeta.id, "a+2").unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientResource {
            needed: 20,
            available: 15,
            ..
        }
    ));
    assert_eq!(harness.ki(goku.id), 15);
    assert_eq!(harness.health(vegeta.id), 10_000);
    assert_eq!(harness.engine.session(ChannelId(1)).unwrap(), &before);
}

#[test]
fn test_malformed_token_is_rejected() {
    let goku = sample_fighter("Goku");
    let vegeta = sample_fighter("Vegeta");
    let mut harness = TestHarness::new([goku.clone(), vegeta.clone()]);
    harness.start(&[goku.id, vegeta.id]).unwrap();

    let err = harness.attack(goku.id, vegeta.id, "a+lots").unwrap_err();
    match err {
        EngineError::Parse(e) => assert_eq!(e.token(), "a+lots"),
        other => panic!("expected parse error, got {other:?}"),
    }
    // mentions and words pass through untouched
    assert!(harness
        .attack(goku.id, vegeta.id, "@vegeta attack everyone mark")
        .is_ok());
}

#[test]
fn test_defeated_target_is_rejected() {
    let goku = sample_fighter("Goku");
    let krillin = sample_fighter("Krillin").with_health(500);
    let mut harness = TestHarness::new([goku.clone(), krillin.clone()]);
    harness.start(&[goku.id, krillin.id]).unwrap();

    let outcome = harness.attack(goku.id, krillin.id, "").unwrap();
    assert!(outcome.effects.iter().any(|e| matches!(
        e,
        Effect::HealthChanged {
            new_current: 0,
            defeated: true,
            ..
        }
    )));
    assert_eq!(harness.health(krillin.id), 0);

    harness.advance().unwrap();
    harness.advance().unwrap();
    assert!(matches!(
        harness.attack(goku.id, krillin.id, ""),
        Err(EngineError::InvalidTarget(_))
    ));
}

#[test]
fn test_only_damage_records_last_opponent() {
    let goku = sample_fighter("Goku");
    let frieza = Character::new("Frieza", "Arcosian", BaseStats::new(5000, 10, 10, 10, 10, 10));
    // the first exchange is dodged: accuracy 5 against evasion 50
    let mut harness =
        TestHarness::with_rolls([goku.clone(), frieza.clone()], ScriptedRolls::new([5, 50]));
    harness.start(&[goku.id, frieza.id]).unwrap();

    let outcome = harness
        .act(
            ActionRequest::new(ChannelId(1), goku.id, frieza.id)
                .with_response(Response::Dodge, ""),
        )
        .unwrap();
    assert!(!outcome.hit);
    assert_eq!(harness.bonus(goku.id).last_attacker_pl, 0);
    assert_eq!(harness.bonus(frieza.id).last_attacker_pl, 0);
    harness.advance().unwrap();
    harness.advance().unwrap();

    let outcome = harness.attack(goku.id, frieza.id, "").unwrap();
    assert_eq!(outcome.final_damage, 1000);
    assert_eq!(harness.bonus(goku.id).last_attacker_pl, 5000);
    assert_eq!(harness.stored_bonus(goku.id).last_attacker_pl, 5000);
    assert_eq!(harness.bonus(frieza.id).last_attacker_pl, 0);
}
