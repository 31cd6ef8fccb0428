//! The combat resolver.
//!
//! [`resolve_exchange`] turns one declared attack and the defender's
//! declared response into a [`Resolution`]. It validates everything up
//! front, so an exchange that fails leaves no trace, and it never mutates
//! its inputs: ki spending, damage, Majin Magic and opponent tracking all
//! come back as effects.
//!
//! Roll order is fixed so scripted roll sources line up:
//! accuracy, evasion (Dodge only), damage (on hit), defense (Block only).

use crate::character::{Attribute, Character, Form};
use crate::config::RulesConfig;
use crate::modifiers::{EffortLevel, ModifierSet, Ratio};
use crate::racial::{self, signed_delta};
use crate::roll::{RollKind, RollSource};
use crate::rules::{Effect, EngineError, KiReason, Resolution};
use crate::session::CombatBonusState;
use crate::stats::{compute_effective_stats, EffectiveStats, StatDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What kind of attack is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionKind {
    #[default]
    Physical,
    Ki,
    Magic,
}

impl ActionKind {
    /// The attribute that powers this kind of attack.
    pub fn main_stat(&self) -> Attribute {
        match self {
            ActionKind::Physical => Attribute::Strength,
            ActionKind::Ki | ActionKind::Magic => Attribute::Control,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Technique {
    #[default]
    Standard,
    Weakpoint,
    Counter,
}

impl Technique {
    /// Pre-multiplier on the main stat.
    pub fn multiplier(&self, config: &RulesConfig) -> Ratio {
        match self {
            Technique::Standard => Ratio::ONE,
            Technique::Weakpoint => config.weakpoint_multiplier,
            Technique::Counter => config.counter_multiplier,
        }
    }
}

/// How the defender answers the attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Response {
    /// Subtract a defense roll from the damage.
    Block,
    /// Contest the accuracy roll with an evasion roll.
    Dodge,
    /// No defensive action.
    #[default]
    Take,
}

/// One side of an exchange.
#[derive(Debug, Clone, Copy)]
pub struct Combatant<'a> {
    pub character: &'a Character,
    pub form: Option<&'a Form>,
    pub bonus: CombatBonusState,
}

impl<'a> Combatant<'a> {
    pub fn new(character: &'a Character, form: Option<&'a Form>, bonus: CombatBonusState) -> Self {
        Self {
            character,
            form,
            bonus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExchangeContext {
    pub kind: ActionKind,
    pub technique: Technique,
    pub response: Response,
}

impl ExchangeContext {
    pub fn new(kind: ActionKind, technique: Technique, response: Response) -> Self {
        Self {
            kind,
            technique,
            response,
        }
    }
}

/// Ki owed for one side's modifiers and effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KiCost {
    /// Cost of `a+` and `a*` above 1.
    pub modifiers: u64,
    /// Effort ki delta. Negative values are a cost.
    pub effort: i64,
}

impl KiCost {
    /// Ki that must be available before the action.
    pub fn spend(&self) -> u64 {
        self.modifiers
            .saturating_add(if self.effort < 0 { self.effort.unsigned_abs() } else { 0 })
    }

    /// Ki restored by a low effort level.
    pub fn gain(&self) -> u64 {
        if self.effort > 0 {
            self.effort as u64
        } else {
            0
        }
    }
}

/// Ki cost of the ki-costed modifiers at the given control.
///
/// `a+N` costs `max(1, floor(N × agility_point_cost × 100 / control))`;
/// `a*r` costs `max(1, floor(steps × accuracy_step_cost × 100 / control))`
/// where `steps` counts started `accuracy_step`s above 1.
pub fn modifier_ki_cost(mods: &ModifierSet, control: u64, config: &RulesConfig) -> u64 {
    let control = control.max(1) as u128;
    let mut cost: u64 = 0;

    if mods.ki_agility() > 0 {
        let units = mods.ki_agility() as u128 * config.agility_point_cost as u128 * 100;
        cost = cost.saturating_add(clamp_cost(units / control));
    }

    let steps = mods.ki_accuracy().steps_above_one(config.accuracy_step);
    if steps > 0 {
        let units = steps as u128 * config.accuracy_step_cost as u128 * 100;
        cost = cost.saturating_add(clamp_cost(units / control));
    }

    cost
}

fn clamp_cost(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX).max(1)
}

/// Effort ki delta: `floor(max_ki × |pct| / 100)`, signed like the table entry.
pub fn effort_ki_delta(effort: EffortLevel, max_ki: u64, config: &RulesConfig) -> i64 {
    let pct = config.effort_ki_percent[effort.index()];
    let magnitude = max_ki as u128 * pct.unsigned_abs() as u128 / 100;
    let magnitude = i64::try_from(magnitude).unwrap_or(i64::MAX);
    if pct < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Full ki bill for one side.
pub fn ki_cost(mods: &ModifierSet, control: u64, max_ki: u64, config: &RulesConfig) -> KiCost {
    KiCost {
        modifiers: modifier_ki_cost(mods, control, config),
        effort: effort_ki_delta(mods.effort(), max_ki, config),
    }
}

/// Result of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub resolution: Resolution,
    pub hit: bool,
    pub final_damage: u64,
}

/// Resolve one attack against one defender.
pub fn resolve_exchange(
    attacker: Combatant<'_>,
    attacker_mods: &ModifierSet,
    defender: Combatant<'_>,
    defender_mods: &ModifierSet,
    ctx: ExchangeContext,
    config: &RulesConfig,
    rolls: &mut dyn RollSource,
) -> Result<ExchangeOutcome, EngineError> {
    let a = attacker.character;
    let d = defender.character;

    // Validation, before any roll.
    if a.id == d.id {
        return Err(EngineError::InvalidTarget(format!(
            "{} cannot attack themselves",
            a.name
        )));
    }
    if a.is_defeated() {
        return Err(EngineError::InvalidTarget(format!(
            "{} is defeated and cannot act",
            a.name
        )));
    }
    if d.is_defeated() {
        return Err(EngineError::InvalidTarget(format!(
            "{} is already defeated",
            d.name
        )));
    }

    let a_stats = compute_effective_stats(
        a,
        attacker.form,
        &attacker.bonus,
        &attacker_delta(attacker_mods, ctx.kind),
    );
    let d_stats = compute_effective_stats(
        d,
        defender.form,
        &defender.bonus,
        &defender_delta(defender_mods, ctx.response),
    );

    let a_cost = ki_cost(attacker_mods, a_stats.control, a_stats.max_ki, config);
    let d_cost = ki_cost(defender_mods, d_stats.control, d_stats.max_ki, config);
    check_affordable(a, &a_cost)?;
    check_affordable(d, &d_cost)?;

    let mut effects = Vec::new();
    let a_ki = pay_ki(a, attacker_mods, &a_cost, &mut effects);
    pay_ki(d, defender_mods, &d_cost, &mut effects);

    // Accuracy contest.
    let accuracy_roll = rolls.roll(RollKind::Accuracy, a_stats.agility);
    effects.push(roll_made(a, RollKind::Accuracy, a_stats.agility, accuracy_roll));
    let accuracy = attacker_mods.accuracy_multiplier().apply(accuracy_roll);

    let evasion = if ctx.response == Response::Dodge {
        let evasion_roll = rolls.roll(RollKind::Evasion, d_stats.agility);
        effects.push(roll_made(d, RollKind::Evasion, d_stats.agility, evasion_roll));
        Some(defender_mods.accuracy_multiplier().apply(evasion_roll))
    } else {
        None
    };

    let hit = evasion.map_or(true, |evasion| accuracy > evasion);
    debug!(
        attacker = %a.name,
        defender = %d.name,
        accuracy,
        evasion = ?evasion,
        hit,
        "accuracy contest"
    );

    let mut final_damage = 0;
    let narrative;
    if hit {
        effects.push(Effect::AttackHit {
            attacker: a.id,
            target: d.id,
            accuracy,
            evasion,
        });

        let main_stat = ctx.technique.multiplier(config).apply(a_stats.get(ctx.kind.main_stat()));
        let damage_roll = rolls.roll(RollKind::Damage, main_stat);
        effects.push(roll_made(a, RollKind::Damage, main_stat, damage_roll));
        let raw = scale_roll(damage_roll, &a_stats, attacker_mods, config);

        let blocked = if ctx.response == Response::Block {
            let defense_roll = rolls.roll(RollKind::Defense, d_stats.defense);
            effects.push(roll_made(d, RollKind::Defense, d_stats.defense, defense_roll));
            scale_roll(defense_roll, &d_stats, defender_mods, config).min(raw)
        } else {
            0
        };

        final_damage = raw - blocked;
        debug!(raw, blocked, final_damage, "damage");
        effects.push(Effect::DamageDealt {
            attacker: a.id,
            target: d.id,
            raw,
            blocked,
            final_damage,
        });

        if final_damage > 0 {
            let new_health = d.health().saturating_sub(final_damage);
            effects.push(Effect::HealthChanged {
                character: d.id,
                amount: signed_delta(d.health(), new_health),
                new_current: new_health,
                max: d.max_health(),
                defeated: new_health == 0,
            });

            let mut spent = a.clone();
            spent.set_ki(a_ki);
            effects.extend(racial::majin_magic(
                &spent,
                &attacker.bonus,
                final_damage,
                d.max_health(),
                config,
            ));
        }

        narrative = if final_damage > 0 {
            format!("{} hits {} for {} damage.", a.name, d.name, final_damage)
        } else {
            format!("{} blocks {}'s attack completely.", d.name, a.name)
        };
    } else {
        let evasion = evasion.unwrap_or_default();
        effects.push(Effect::AttackMissed {
            attacker: a.id,
            target: d.id,
            accuracy,
            evasion,
        });
        narrative = format!("{} dodges {}'s attack.", d.name, a.name);
    }

    if final_damage > 0 {
        effects.push(Effect::OpponentRecorded {
            character: a.id,
            opponent_pl: d_stats.effective_pl,
        });
    }

    Ok(ExchangeOutcome {
        resolution: Resolution::new(narrative).with_effects(effects),
        hit,
        final_damage,
    })
}

/// Attacker deltas: `m±` on the main stat, `a±`/`ma±` on agility.
fn attacker_delta(mods: &ModifierSet, kind: ActionKind) -> StatDelta {
    StatDelta::on(kind.main_stat(), mods.main_stat())
        .plus(Attribute::Agility, mods.accuracy_agility_delta())
}

/// Defender deltas: `m±` on defense when blocking or agility when dodging.
fn defender_delta(mods: &ModifierSet, response: Response) -> StatDelta {
    let delta = StatDelta::on(Attribute::Agility, mods.accuracy_agility_delta());
    match response {
        Response::Block => delta.plus(Attribute::Defense, mods.main_stat()),
        Response::Dodge => delta.plus(Attribute::Agility, mods.main_stat()),
        Response::Take => delta,
    }
}

/// `roll × effective_pl / damage_scale`, then effort intensity, then `m*`.
fn scale_roll(roll: u64, stats: &EffectiveStats, mods: &ModifierSet, config: &RulesConfig) -> u64 {
    let scaled = roll as u128 * stats.effective_pl as u128 / config.damage_scale.max(1) as u128;
    let scaled = u64::try_from(scaled).unwrap_or(u64::MAX);
    let intensity = config.effort_intensity[mods.effort().index()].apply(scaled);
    mods.roll_scale().apply(intensity)
}

fn check_affordable(character: &Character, cost: &KiCost) -> Result<(), EngineError> {
    let needed = cost.spend();
    if needed > character.ki() {
        return Err(EngineError::InsufficientResource {
            character: character.name.clone(),
            resource: "ki",
            needed,
            available: character.ki(),
        });
    }
    Ok(())
}

/// Emit ki effects for one side and return its ki afterwards.
fn pay_ki(
    character: &Character,
    mods: &ModifierSet,
    cost: &KiCost,
    effects: &mut Vec<Effect>,
) -> u64 {
    let max = character.max_ki();
    let mut ki = character.ki();

    if cost.modifiers > 0 {
        let after = ki - cost.modifiers;
        effects.push(Effect::KiChanged {
            character: character.id,
            amount: signed_delta(ki, after),
            new_current: after,
            max,
            reason: KiReason::Modifiers,
        });
        ki = after;
    }

    if cost.effort != 0 {
        let after = if cost.effort < 0 {
            ki - cost.effort.unsigned_abs()
        } else {
            ki.saturating_add(cost.gain()).min(max)
        };
        if after != ki {
            effects.push(Effect::KiChanged {
                character: character.id,
                amount: signed_delta(ki, after),
                new_current: after,
                max,
                reason: KiReason::Effort,
            });
        }
        ki = after;
    }

    debug!(
        character = %character.name,
        effort = mods.effort().level(),
        modifier_cost = cost.modifiers,
        effort_delta = cost.effort,
        ki,
        "ki settled"
    );
    ki
}

fn roll_made(character: &Character, kind: RollKind, stat: u64, result: u64) -> Effect {
    Effect::RollMade {
        character: character.id,
        kind,
        stat,
        result,
    }
}
