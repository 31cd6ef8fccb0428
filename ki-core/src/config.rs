//! Rules configuration.
//!
//! Every balance constant of the combat rules lives in [`RulesConfig`].
//! Defaults are the canonical rules; servers may override them from a JSON
//! file, and any field left out of the file keeps its default.

use crate::modifiers::Ratio;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from loading a rules configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid rules config: {0}")]
    Invalid(String),
}

/// Balance constants for the combat rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Zenkai gain as a percentage of base PL.
    pub zenkai_gain_percent: u64,

    /// Majin Magic bonus cap as a percentage of base PL.
    pub majin_magic_cap_percent: u64,

    /// Regeneration heal per turn, percent of max health.
    pub regeneration_basic_percent: u64,

    /// Enhanced regeneration heal per turn, percent of max health.
    pub regeneration_enhanced_percent: u64,

    /// Enhanced regeneration costs `floor(factor × 100 / control)` ki.
    pub enhanced_regeneration_ki_factor: u64,

    /// Ki per point of `a+`, before control scaling.
    pub agility_point_cost: u64,

    /// Ki per started `accuracy_step` of `a*` above 1, before control scaling.
    pub accuracy_step_cost: u64,

    /// Width of one `a*` cost step.
    pub accuracy_step: Ratio,

    /// Ki delta per effort level 1..=5 as a percentage of max ki.
    /// Positive values restore ki, negative values cost ki.
    pub effort_ki_percent: [i64; 5],

    /// Damage and defense intensity per effort level 1..=5.
    pub effort_intensity: [Ratio; 5],

    /// Rolled damage is multiplied by `effective_pl / damage_scale`.
    pub damage_scale: u64,

    /// Main stat pre-multiplier for Weakpoint strikes.
    pub weakpoint_multiplier: Ratio,

    /// Main stat pre-multiplier for Counters.
    pub counter_multiplier: Ratio,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            zenkai_gain_percent: 10,
            majin_magic_cap_percent: 50,
            regeneration_basic_percent: 10,
            regeneration_enhanced_percent: 20,
            enhanced_regeneration_ki_factor: 3,
            agility_point_cost: 1,
            accuracy_step_cost: 5,
            accuracy_step: Ratio::from_parts(1, 2),
            effort_ki_percent: [3, 0, -5, -7, -10],
            effort_intensity: [
                Ratio::from_parts(3, 4),
                Ratio::ONE,
                Ratio::from_parts(5, 4),
                Ratio::from_parts(3, 2),
                Ratio::from_parts(2, 1),
            ],
            damage_scale: 10,
            weakpoint_multiplier: Ratio::from_parts(7, 10),
            counter_multiplier: Ratio::from_parts(4, 5),
        }
    }
}

impl RulesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the basic and enhanced regeneration rates (percent of max health).
    pub fn with_regeneration_rates(mut self, basic: u64, enhanced: u64) -> Self {
        self.regeneration_basic_percent = basic;
        self.regeneration_enhanced_percent = enhanced;
        self
    }

    pub fn with_zenkai_gain_percent(mut self, percent: u64) -> Self {
        self.zenkai_gain_percent = percent;
        self
    }

    pub fn with_majin_magic_cap_percent(mut self, percent: u64) -> Self {
        self.majin_magic_cap_percent = percent;
        self
    }

    pub fn with_damage_scale(mut self, scale: u64) -> Self {
        self.damage_scale = scale;
        self
    }

    pub fn with_effort_intensity(mut self, table: [Ratio; 5]) -> Self {
        self.effort_intensity = table;
        self
    }

    /// Check invariants the rules depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.damage_scale == 0 {
            return Err(ConfigError::Invalid("damage_scale must be positive".into()));
        }
        if self.accuracy_step.is_zero() {
            return Err(ConfigError::Invalid("accuracy_step must be positive".into()));
        }
        if self.regeneration_basic_percent > 100 || self.regeneration_enhanced_percent > 100 {
            return Err(ConfigError::Invalid(
                "regeneration rates are percentages of max health (0-100)".into(),
            ));
        }
        if self.effort_ki_percent.iter().any(|p| p.unsigned_abs() > 100) {
            return Err(ConfigError::Invalid(
                "effort ki deltas are percentages of max ki (-100..=100)".into(),
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }
}
