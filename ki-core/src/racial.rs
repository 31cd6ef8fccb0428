//! Racial ability rules: Zenkai, Majin Magic and Regeneration.
//!
//! Every rule is a pure function over snapshots. The `*_gain` and plan
//! helpers do the arithmetic; the rule functions check the ability tag and
//! wrap the numbers in [`Effect`]s for the engine to commit.

use crate::character::{AbilityTag, Character, Form};
use crate::config::RulesConfig;
use crate::rules::{Effect, KiReason};
use crate::session::CombatBonusState;
use crate::stats::{compute_effective_stats, StatDelta};
use tracing::debug;

// ============================================================================
// Zenkai
// ============================================================================

/// Zenkai gain per qualifying turn: `floor(base_pl × zenkai_gain_percent / 100)`.
pub fn zenkai_gain(base_pl: u64, config: &RulesConfig) -> u64 {
    percent_of(base_pl, config.zenkai_gain_percent)
}

/// End-of-turn Zenkai check.
///
/// Fires when the last opponent faced is stronger than the character's
/// current effective PL, measured before the gain.
pub fn zenkai(
    character: &Character,
    form: Option<&Form>,
    bonus: &CombatBonusState,
    config: &RulesConfig,
) -> Vec<Effect> {
    if !character.has_ability(&AbilityTag::Zenkai) {
        return Vec::new();
    }

    let stats = compute_effective_stats(character, form, bonus, &StatDelta::none());
    let qualifies = bonus.last_attacker_pl > stats.effective_pl;
    debug!(
        character = %character.name,
        opponent_pl = bonus.last_attacker_pl,
        effective_pl = stats.effective_pl,
        qualifies,
        "zenkai check"
    );
    if !qualifies {
        return Vec::new();
    }

    let gain = zenkai_gain(character.base.base_pl, config);
    if gain == 0 {
        return Vec::new();
    }
    vec![Effect::ZenkaiGained {
        character: character.id,
        gain,
        new_total: bonus.zenkai_bonus.saturating_add(gain),
    }]
}

// ============================================================================
// Majin Magic
// ============================================================================

/// The numbers behind one Majin Magic trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MajinMagicOutcome {
    /// `floor(max_ki × lost / H)`, before clamping to max ki.
    pub ki_gain: u64,
    /// Ki after the gain, clamped to max ki.
    pub new_ki: u64,
    /// `floor(base_pl × lost / H)`.
    pub raw_gain: u64,
    /// The part of `raw_gain` that fits under the cap.
    pub actual_gain: u64,
    pub new_bonus: u64,
}

/// Majin Magic arithmetic for `final_damage` dealt to a target with
/// `target_max_health`. Damage beyond the target's maximum counts as 100%.
pub fn majin_magic_gain(
    attacker: &Character,
    current_bonus: u64,
    final_damage: u64,
    target_max_health: u64,
    config: &RulesConfig,
) -> MajinMagicOutcome {
    let max_ki = attacker.max_ki();
    let current_ki = attacker.ki();

    if target_max_health == 0 || final_damage == 0 {
        return MajinMagicOutcome {
            ki_gain: 0,
            new_ki: current_ki,
            raw_gain: 0,
            actual_gain: 0,
            new_bonus: current_bonus,
        };
    }

    let lost = final_damage.min(target_max_health);
    let ki_gain = scale(max_ki, lost, target_max_health);
    let new_ki = current_ki.saturating_add(ki_gain).min(max_ki);

    let max_bonus = percent_of(attacker.base.base_pl, config.majin_magic_cap_percent);
    let raw_gain = scale(attacker.base.base_pl, lost, target_max_health);
    let actual_gain = raw_gain.min(max_bonus.saturating_sub(current_bonus));

    MajinMagicOutcome {
        ki_gain,
        new_ki,
        raw_gain,
        actual_gain,
        new_bonus: current_bonus.saturating_add(actual_gain),
    }
}

/// Majin Magic trigger after the attacker dealt `final_damage`.
///
/// `attacker` must already reflect any ki spent on the action.
pub fn majin_magic(
    attacker: &Character,
    bonus: &CombatBonusState,
    final_damage: u64,
    target_max_health: u64,
    config: &RulesConfig,
) -> Vec<Effect> {
    if final_damage == 0 || !attacker.has_ability(&AbilityTag::MajinMagic) {
        return Vec::new();
    }

    let outcome = majin_magic_gain(
        attacker,
        bonus.majin_magic_bonus,
        final_damage,
        target_max_health,
        config,
    );
    debug!(
        character = %attacker.name,
        final_damage,
        target_max_health,
        ki_gain = outcome.ki_gain,
        raw_gain = outcome.raw_gain,
        actual_gain = outcome.actual_gain,
        "majin magic"
    );

    let mut effects = Vec::with_capacity(2);
    if outcome.new_ki != attacker.ki() {
        effects.push(Effect::KiChanged {
            character: attacker.id,
            amount: signed_delta(attacker.ki(), outcome.new_ki),
            new_current: outcome.new_ki,
            max: attacker.max_ki(),
            reason: KiReason::MajinMagic,
        });
    }
    effects.push(Effect::MajinMagicTriggered {
        character: attacker.id,
        ki_gain: outcome.ki_gain,
        raw_gain: outcome.raw_gain,
        actual_gain: outcome.actual_gain,
        new_bonus: outcome.new_bonus,
    });
    effects
}

// ============================================================================
// Regeneration
// ============================================================================

/// What regeneration will do this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerationPlan {
    /// No regeneration ability, or already at full health.
    Idle,
    Heal {
        healed: u64,
        ki_cost: u64,
        enhanced: bool,
    },
    /// Enhanced mode is on but ki does not cover the cost.
    Skipped { ki_needed: u64, ki_available: u64 },
}

/// Ki cost of one enhanced regeneration: `floor(factor × 100 / control)`.
pub fn enhanced_regeneration_cost(control: u64, config: &RulesConfig) -> u64 {
    config.enhanced_regeneration_ki_factor.saturating_mul(100) / control.max(1)
}

/// Plan the end-of-turn regeneration for a character.
///
/// The enhancement tag implies the base ability.
pub fn plan_regeneration(
    character: &Character,
    form: Option<&Form>,
    config: &RulesConfig,
) -> RegenerationPlan {
    let regenerates = character.has_ability(&AbilityTag::Regeneration)
        || character.has_ability(&AbilityTag::EnhancedRegeneration);
    let max_health = character.max_health();
    if !regenerates || character.health() >= max_health {
        return RegenerationPlan::Idle;
    }

    let enhanced = character.ability_active(&AbilityTag::EnhancedRegeneration);
    let rate = if enhanced {
        config.regeneration_enhanced_percent
    } else {
        config.regeneration_basic_percent
    };

    let ki_cost = if enhanced {
        let control = form
            .map(|f| f.control_modifier.apply(character.base.control))
            .unwrap_or(character.base.control);
        let cost = enhanced_regeneration_cost(control, config);
        if cost > character.ki() {
            return RegenerationPlan::Skipped {
                ki_needed: cost,
                ki_available: character.ki(),
            };
        }
        cost
    } else {
        0
    };

    let healed = percent_of(max_health, rate).min(max_health - character.health());
    RegenerationPlan::Heal {
        healed,
        ki_cost,
        enhanced,
    }
}

/// End-of-turn regeneration.
pub fn regeneration(character: &Character, form: Option<&Form>, config: &RulesConfig) -> Vec<Effect> {
    match plan_regeneration(character, form, config) {
        RegenerationPlan::Idle => Vec::new(),
        RegenerationPlan::Skipped {
            ki_needed,
            ki_available,
        } => {
            debug!(
                character = %character.name,
                ki_needed,
                ki_available,
                "enhanced regeneration skipped"
            );
            vec![Effect::RegenerationSkipped {
                character: character.id,
                ki_needed,
                ki_available,
            }]
        }
        RegenerationPlan::Heal {
            healed,
            ki_cost,
            enhanced,
        } => {
            debug!(character = %character.name, healed, ki_cost, enhanced, "regeneration");
            let mut effects = vec![Effect::Regenerated {
                character: character.id,
                healed,
                ki_cost,
                enhanced,
            }];
            if healed > 0 {
                let new_current = character.health() + healed;
                effects.push(Effect::HealthChanged {
                    character: character.id,
                    amount: healed as i64,
                    new_current,
                    max: character.max_health(),
                    defeated: false,
                });
            }
            if ki_cost > 0 {
                effects.push(Effect::KiChanged {
                    character: character.id,
                    amount: -(ki_cost as i64),
                    new_current: character.ki() - ki_cost,
                    max: character.max_ki(),
                    reason: KiReason::Regeneration,
                });
            }
            effects
        }
    }
}

/// End-of-turn effects for the character whose turn just completed:
/// Regeneration first, then Zenkai.
///
/// Zenkai compares against the PL the character ended the turn with, so ki
/// spent on enhanced regeneration never makes it fire.
pub fn end_of_turn(
    character: &Character,
    form: Option<&Form>,
    bonus: &CombatBonusState,
    config: &RulesConfig,
) -> Vec<Effect> {
    let mut effects = regeneration(character, form, config);
    effects.extend(zenkai(character, form, bonus, config));
    effects
}

// ============================================================================
// Arithmetic
// ============================================================================

fn percent_of(value: u64, percent: u64) -> u64 {
    scale(value, percent, 100)
}

/// `floor(value × num / den)` in 128-bit space.
fn scale(value: u64, num: u64, den: u64) -> u64 {
    if den == 0 {
        return 0;
    }
    let scaled = value as u128 * num as u128 / den as u128;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

pub(crate) fn signed_delta(before: u64, after: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map(|d| -d).unwrap_or(i64::MIN)
    }
}
