//! Effective stat computation.
//!
//! Effective stats are never stored. They are recomputed from the persisted
//! base attributes, the active form, and the session bonus state every time
//! they are needed:
//!
//! ```text
//! effective_pl = (base_pl × form.pl + zenkai + majin_magic) × ki_fraction
//! attribute    = base × form factor + per-action delta
//! ```
//!
//! Power level contributions are kept as an ordered list so each source can
//! be audited and cleared independently.

use crate::character::{Attribute, Character, Form};
use crate::modifiers::Ratio;
use crate::session::CombatBonusState;
use serde::{Deserialize, Serialize};

/// Per-action attribute deltas. Applied for one resolution and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatDelta {
    pub strength: i64,
    pub defense: i64,
    pub agility: i64,
    pub endurance: i64,
    pub control: i64,
}

impl StatDelta {
    pub fn none() -> Self {
        Self::default()
    }

    /// A delta on a single attribute.
    pub fn on(attribute: Attribute, amount: i64) -> Self {
        Self::none().plus(attribute, amount)
    }

    pub fn plus(mut self, attribute: Attribute, amount: i64) -> Self {
        let slot = match attribute {
            Attribute::Strength => &mut self.strength,
            Attribute::Defense => &mut self.defense,
            Attribute::Agility => &mut self.agility,
            Attribute::Endurance => &mut self.endurance,
            Attribute::Control => &mut self.control,
        };
        *slot = slot.saturating_add(amount);
        self
    }

    pub fn get(&self, attribute: Attribute) -> i64 {
        match attribute {
            Attribute::Strength => self.strength,
            Attribute::Defense => self.defense,
            Attribute::Agility => self.agility,
            Attribute::Endurance => self.endurance,
            Attribute::Control => self.control,
        }
    }
}

/// Where a slice of effective power level comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlSource {
    /// Base PL scaled by the active form.
    Base,
    /// Session-scoped Zenkai accrual.
    Zenkai,
    /// Session-scoped Majin Magic bonus.
    MajinMagic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlContribution {
    pub source: PlSource,
    pub amount: u64,
}

/// Stats used for one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveStats {
    pub effective_pl: u64,
    /// Ordered contributions summed before ki scaling.
    pub pl_breakdown: Vec<PlContribution>,
    /// `current_ki / max_ki`, clamped to `[0, 1]`.
    pub ki_fraction: Ratio,
    pub strength: u64,
    pub defense: u64,
    pub agility: u64,
    pub endurance: u64,
    pub control: u64,
    pub max_health: u64,
    pub max_ki: u64,
}

impl EffectiveStats {
    pub fn get(&self, attribute: Attribute) -> u64 {
        match attribute {
            Attribute::Strength => self.strength,
            Attribute::Defense => self.defense,
            Attribute::Agility => self.agility,
            Attribute::Endurance => self.endurance,
            Attribute::Control => self.control,
        }
    }

    /// Power level before ki scaling.
    pub fn composed_pl(&self) -> u64 {
        self.pl_breakdown
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.amount))
    }

    pub fn contribution(&self, source: PlSource) -> u64 {
        self.pl_breakdown
            .iter()
            .filter(|c| c.source == source)
            .map(|c| c.amount)
            .sum()
    }
}

/// Compute effective stats. Pure: identical inputs give identical outputs.
pub fn compute_effective_stats(
    character: &Character,
    form: Option<&Form>,
    bonus: &CombatBonusState,
    delta: &StatDelta,
) -> EffectiveStats {
    let pl_factor = form.map(|f| f.pl_modifier).unwrap_or(Ratio::ONE);

    let pl_breakdown = vec![
        PlContribution {
            source: PlSource::Base,
            amount: pl_factor.apply(character.base.base_pl),
        },
        PlContribution {
            source: PlSource::Zenkai,
            amount: bonus.zenkai_bonus,
        },
        PlContribution {
            source: PlSource::MajinMagic,
            amount: bonus.majin_magic_bonus,
        },
    ];

    let max_ki = character.max_ki();
    let ki_fraction = if max_ki == 0 {
        Ratio::ONE
    } else {
        Ratio::new(character.ki().min(max_ki), max_ki).unwrap_or(Ratio::ONE)
    };

    let attribute = |attr: Attribute| -> u64 {
        let factor = form.map(|f| f.factor(attr)).unwrap_or(Ratio::ONE);
        let scaled = factor.apply(character.base.get(attr));
        apply_delta(scaled, delta.get(attr))
    };

    let mut stats = EffectiveStats {
        effective_pl: 0,
        pl_breakdown,
        ki_fraction,
        strength: attribute(Attribute::Strength),
        defense: attribute(Attribute::Defense),
        agility: attribute(Attribute::Agility),
        endurance: attribute(Attribute::Endurance),
        control: attribute(Attribute::Control),
        max_health: character.max_health(),
        max_ki,
    };
    stats.effective_pl = ki_fraction.apply(stats.composed_pl());
    stats
}

fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta >= 0 {
        value.saturating_add(delta as u64)
    } else {
        value.saturating_sub(delta.unsigned_abs())
    }
}
