//! Turn-based combat engine for persistent chat role-play.
//!
//! This crate provides:
//! - A modifier token parser (`e4 a+2 m*1.5 ma+3 ...`)
//! - Effective stat computation from base attributes, forms and session bonuses
//! - Racial ability rules: Zenkai, Majin Magic and Regeneration
//! - An attack/defense resolver driven by a pluggable roll source
//! - A per-channel turn state machine
//! - Effect descriptors committed through a narrow store interface
//!
//! # Quick Start
//!
//! ```ignore
//! use ki_core::{ActionRequest, ChannelId, CombatEngine, MemoryStore, RulesConfig};
//!
//! let mut engine = CombatEngine::new(store, RulesConfig::default());
//! engine.start_session(ChannelId(42), vec![goku.id, vegeta.id])?;
//!
//! let outcome = engine.resolve_action(
//!     ActionRequest::new(ChannelId(42), goku.id, vegeta.id).with_tokens("e4 a+2"),
//! )?;
//! println!("{}", outcome.narrative);
//!
//! engine.advance_turn(ChannelId(42))?;
//! engine.end_session(ChannelId(42))?;
//! ```

pub mod character;
pub mod combat;
pub mod config;
pub mod engine;
pub mod modifiers;
pub mod persist;
pub mod racial;
pub mod roll;
pub mod rules;
pub mod session;
pub mod stats;
pub mod testing;

// Primary public API
pub use character::{
    AbilityTag, Attribute, BaseStats, ChannelId, Character, CharacterId, Form, OwnerId, RacialTag,
    Resources,
};
pub use combat::{resolve_exchange, ActionKind, Combatant, ExchangeContext, Response, Technique};
pub use config::{ConfigError, RulesConfig};
pub use engine::{ActionRequest, CombatEngine, Outcome, SharedEngine};
pub use modifiers::{parse_modifiers, EffortLevel, Modifier, ModifierSet, ParseError, Ratio};
pub use persist::{CombatStore, MemoryStore, RetryPolicy, StoreError};
pub use roll::{DiceRoller, FixedRolls, RollKind, RollSource, ScriptedRolls};
pub use rules::{Effect, EngineError, KiReason, Resolution};
pub use session::{CombatBonusState, CombatSession, SessionStatus, SessionSummary, TurnStateMachine};
pub use stats::{compute_effective_stats, EffectiveStats, PlSource, StatDelta};
pub use testing::TestHarness;
