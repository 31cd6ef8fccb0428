//! Character and form types.
//!
//! Characters and forms are owned by the row store; the engine only ever
//! holds snapshots of them, computes, and writes the snapshot back.

use crate::modifiers::Ratio;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum ki granted per point of base endurance.
pub const KI_PER_ENDURANCE: u64 = 10;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat channel hosting a combat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The player account that owns a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

// ============================================================================
// Attributes
// ============================================================================

/// The five combat attributes besides power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Strength,
    Defense,
    Agility,
    Endurance,
    Control,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Strength => "strength",
            Attribute::Defense => "defense",
            Attribute::Agility => "agility",
            Attribute::Endurance => "endurance",
            Attribute::Control => "control",
        }
    }

    pub fn all() -> [Attribute; 5] {
        [
            Attribute::Strength,
            Attribute::Defense,
            Attribute::Agility,
            Attribute::Endurance,
            Attribute::Control,
        ]
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Persisted base attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub base_pl: u64,
    pub strength: u64,
    pub defense: u64,
    pub agility: u64,
    pub endurance: u64,
    pub control: u64,
}

impl BaseStats {
    pub fn new(
        base_pl: u64,
        strength: u64,
        defense: u64,
        agility: u64,
        endurance: u64,
        control: u64,
    ) -> Self {
        Self {
            base_pl,
            strength,
            defense,
            agility,
            endurance,
            control,
        }
    }

    pub fn get(&self, attribute: Attribute) -> u64 {
        match attribute {
            Attribute::Strength => self.strength,
            Attribute::Defense => self.defense,
            Attribute::Agility => self.agility,
            Attribute::Endurance => self.endurance,
            Attribute::Control => self.control,
        }
    }
}

/// Current health and ki. Persist across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub current_health: u64,
    pub current_ki: u64,
}

// ============================================================================
// Racial abilities
// ============================================================================

/// Racial ability tags as stored on a character row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AbilityTag {
    /// `zenkai`: power gain after facing stronger opponents.
    Zenkai,
    /// `mmagic`: converts damage dealt into ki and power.
    MajinMagic,
    /// `mregen`: end-of-turn healing.
    Regeneration,
    /// `mregen_enhanced`: ki-costed stronger healing, toggled on and off.
    EnhancedRegeneration,
    /// Any tag this engine has no rule for.
    Other(String),
}

impl AbilityTag {
    pub fn as_str(&self) -> &str {
        match self {
            AbilityTag::Zenkai => "zenkai",
            AbilityTag::MajinMagic => "mmagic",
            AbilityTag::Regeneration => "mregen",
            AbilityTag::EnhancedRegeneration => "mregen_enhanced",
            AbilityTag::Other(tag) => tag,
        }
    }
}

impl From<&str> for AbilityTag {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "zenkai" => AbilityTag::Zenkai,
            "mmagic" => AbilityTag::MajinMagic,
            "mregen" => AbilityTag::Regeneration,
            "mregen_enhanced" => AbilityTag::EnhancedRegeneration,
            _ => AbilityTag::Other(value.to_string()),
        }
    }
}

impl From<String> for AbilityTag {
    fn from(value: String) -> Self {
        AbilityTag::from(value.as_str())
    }
}

impl From<AbilityTag> for String {
    fn from(value: AbilityTag) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AbilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A racial ability granted to a character, with its toggle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RacialTag {
    pub tag: AbilityTag,
    #[serde(default)]
    pub is_active: bool,
}

impl RacialTag {
    pub fn new(tag: AbilityTag) -> Self {
        Self {
            tag,
            is_active: false,
        }
    }

    pub fn active(tag: AbilityTag) -> Self {
        Self {
            tag,
            is_active: true,
        }
    }
}

// ============================================================================
// Forms
// ============================================================================

/// A transformation: a named bundle of stat multipliers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub name: String,
    #[serde(default)]
    pub pl_modifier: Ratio,
    #[serde(default)]
    pub strength_modifier: Ratio,
    #[serde(default)]
    pub defense_modifier: Ratio,
    #[serde(default)]
    pub agility_modifier: Ratio,
    #[serde(default)]
    pub endurance_modifier: Ratio,
    #[serde(default)]
    pub control_modifier: Ratio,
}

impl Form {
    /// A form with every modifier at 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pl_modifier: Ratio::ONE,
            strength_modifier: Ratio::ONE,
            defense_modifier: Ratio::ONE,
            agility_modifier: Ratio::ONE,
            endurance_modifier: Ratio::ONE,
            control_modifier: Ratio::ONE,
        }
    }

    pub fn with_pl(mut self, modifier: Ratio) -> Self {
        self.pl_modifier = modifier;
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute, modifier: Ratio) -> Self {
        match attribute {
            Attribute::Strength => self.strength_modifier = modifier,
            Attribute::Defense => self.defense_modifier = modifier,
            Attribute::Agility => self.agility_modifier = modifier,
            Attribute::Endurance => self.endurance_modifier = modifier,
            Attribute::Control => self.control_modifier = modifier,
        }
        self
    }

    pub fn factor(&self, attribute: Attribute) -> Ratio {
        match attribute {
            Attribute::Strength => self.strength_modifier,
            Attribute::Defense => self.defense_modifier,
            Attribute::Agility => self.agility_modifier,
            Attribute::Endurance => self.endurance_modifier,
            Attribute::Control => self.control_modifier,
        }
    }
}

// ============================================================================
// Character
// ============================================================================

/// A persistent roleplay character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub owner: OwnerId,
    pub name: String,
    pub race: String,
    pub base: BaseStats,
    pub resources: Resources,
    /// Name of the active form, if transformed.
    #[serde(default)]
    pub active_form: Option<String>,
    #[serde(default)]
    pub racial_tags: Vec<RacialTag>,
}

impl Character {
    /// Create a character at full health and ki.
    pub fn new(name: impl Into<String>, race: impl Into<String>, base: BaseStats) -> Self {
        let mut character = Self {
            id: CharacterId::new(),
            owner: OwnerId::default(),
            name: name.into(),
            race: race.into(),
            base,
            resources: Resources::default(),
            active_form: None,
            racial_tags: Vec::new(),
        };
        character.resources = Resources {
            current_health: character.max_health(),
            current_ki: character.max_ki(),
        };
        character
    }

    pub fn with_owner(mut self, owner: OwnerId) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_tag(mut self, tag: RacialTag) -> Self {
        self.racial_tags.retain(|t| t.tag != tag.tag);
        self.racial_tags.push(tag);
        self
    }

    pub fn with_form(mut self, form_name: impl Into<String>) -> Self {
        self.active_form = Some(form_name.into());
        self
    }

    pub fn with_health(mut self, health: u64) -> Self {
        self.set_health(health);
        self
    }

    pub fn with_ki(mut self, ki: u64) -> Self {
        self.set_ki(ki);
        self
    }

    /// `base_pl × endurance`.
    pub fn max_health(&self) -> u64 {
        self.base.base_pl.saturating_mul(self.base.endurance)
    }

    /// `endurance × KI_PER_ENDURANCE`.
    pub fn max_ki(&self) -> u64 {
        self.base.endurance.saturating_mul(KI_PER_ENDURANCE)
    }

    pub fn health(&self) -> u64 {
        self.resources.current_health
    }

    pub fn ki(&self) -> u64 {
        self.resources.current_ki
    }

    /// Set health, clamped to `[0, max_health]`.
    pub fn set_health(&mut self, value: u64) {
        self.resources.current_health = value.min(self.max_health());
    }

    /// Set ki, clamped to `[0, max_ki]`.
    pub fn set_ki(&mut self, value: u64) {
        self.resources.current_ki = value.min(self.max_ki());
    }

    pub fn is_defeated(&self) -> bool {
        self.resources.current_health == 0
    }

    pub fn has_ability(&self, tag: &AbilityTag) -> bool {
        self.racial_tags.iter().any(|t| &t.tag == tag)
    }

    /// Whether a togglable ability is present and switched on.
    pub fn ability_active(&self, tag: &AbilityTag) -> bool {
        self.racial_tags.iter().any(|t| &t.tag == tag && t.is_active)
    }

    pub fn tag_mut(&mut self, tag: &AbilityTag) -> Option<&mut RacialTag> {
        self.racial_tags.iter_mut().find(|t| &t.tag == tag)
    }
}
