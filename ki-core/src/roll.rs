//! Roll sources for the combat contest.
//!
//! The resolver never touches an RNG directly; it asks a [`RollSource`] for a
//! value given the kind of roll and the stat backing it. Production code uses
//! [`DiceRoller`]; tests plug in [`FixedRolls`] or [`ScriptedRolls`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What a roll is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollKind {
    Accuracy,
    Evasion,
    Damage,
    Defense,
}

/// Produces roll values from a backing stat.
pub trait RollSource: Send {
    fn roll(&mut self, kind: RollKind, stat: u64) -> u64;
}

/// Random rolls in a percentage band around the stat.
///
/// With the default band a roll lands in `[80%, 120%]` of the stat.
pub struct DiceRoller<R: Rng + Send = StdRng> {
    rng: R,
    low_percent: u64,
    high_percent: u64,
}

impl DiceRoller<StdRng> {
    /// Roller seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng + Send> DiceRoller<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            low_percent: 80,
            high_percent: 120,
        }
    }

    /// Set the roll band in percent of the stat. `low` is clamped to `high`.
    pub fn with_band(mut self, low: u64, high: u64) -> Self {
        self.low_percent = low.min(high);
        self.high_percent = high;
        self
    }
}

impl<R: Rng + Send> RollSource for DiceRoller<R> {
    fn roll(&mut self, _kind: RollKind, stat: u64) -> u64 {
        let percent = self.rng.gen_range(self.low_percent..=self.high_percent);
        let value = stat as u128 * percent as u128 / 100;
        u64::try_from(value).unwrap_or(u64::MAX)
    }
}

/// Deterministic rolls at a fixed percentage of the stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRolls {
    pub percent: u64,
}

impl FixedRolls {
    /// Every roll returns exactly the stat.
    pub fn exact() -> Self {
        Self { percent: 100 }
    }
}

impl RollSource for FixedRolls {
    fn roll(&mut self, _kind: RollKind, stat: u64) -> u64 {
        let value = stat as u128 * self.percent as u128 / 100;
        u64::try_from(value).unwrap_or(u64::MAX)
    }
}

/// Returns queued values in order, then falls back to the stat itself.
///
/// Every call is recorded so tests can assert which rolls were made.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRolls {
    queue: VecDeque<u64>,
    history: Vec<(RollKind, u64, u64)>,
}

impl ScriptedRolls {
    pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
        Self {
            queue: values.into_iter().collect(),
            history: Vec::new(),
        }
    }

    pub fn push(&mut self, value: u64) {
        self.queue.push_back(value);
    }

    /// `(kind, stat, result)` for every roll made so far.
    pub fn history(&self) -> &[(RollKind, u64, u64)] {
        &self.history
    }
}

impl RollSource for ScriptedRolls {
    fn roll(&mut self, kind: RollKind, stat: u64) -> u64 {
        let value = self.queue.pop_front().unwrap_or(stat);
        self.history.push((kind, stat, value));
        value
    }
}
