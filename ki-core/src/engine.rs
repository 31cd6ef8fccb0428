//! The combat engine: the thin adapter between the command layer, the pure
//! rules and the store.
//!
//! Every operation follows the same shape: load snapshots, run the pure
//! layers, then commit the returned effects. If a store write fails after
//! retries, the in-memory session is rolled back and the session row, its
//! bonus rows and the original character rows are written back, so a request
//! either lands whole or not at all.

use crate::character::{AbilityTag, Character, CharacterId, ChannelId, Form};
use crate::combat::{resolve_exchange, ActionKind, Combatant, ExchangeContext, Response, Technique};
use crate::config::RulesConfig;
use crate::modifiers::parse_modifiers;
use crate::persist::{CombatStore, RetryPolicy, StoreError};
use crate::roll::{DiceRoller, RollSource};
use crate::rules::{apply_effects, Effect, EngineError, Resolution};
use crate::session::{CombatBonusState, CombatSession, SessionSummary, TurnStateMachine};
use crate::stats::{compute_effective_stats, EffectiveStats, StatDelta};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// An engine shared across async tasks. All channels serialize on one lock.
pub type SharedEngine<S> = Arc<Mutex<CombatEngine<S>>>;

/// One attack as declared by the command layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub channel: ChannelId,
    pub actor: CharacterId,
    pub target: CharacterId,
    pub kind: ActionKind,
    pub technique: Technique,
    /// Raw argument tokens from the attacker.
    pub tokens: Vec<String>,
    pub response: Response,
    /// Raw argument tokens from the defender's response.
    pub defender_tokens: Vec<String>,
}

impl ActionRequest {
    /// A standard physical attack the defender takes.
    pub fn new(channel: ChannelId, actor: CharacterId, target: CharacterId) -> Self {
        Self {
            channel,
            actor,
            target,
            kind: ActionKind::default(),
            technique: Technique::default(),
            tokens: Vec::new(),
            response: Response::default(),
            defender_tokens: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: ActionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.technique = technique;
        self
    }

    /// Attacker tokens from a whitespace-separated argument string.
    pub fn with_tokens(mut self, args: &str) -> Self {
        self.tokens = args.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn with_response(mut self, response: Response, args: &str) -> Self {
        self.response = response;
        self.defender_tokens = args.split_whitespace().map(str::to_string).collect();
        self
    }
}

/// What a resolved action did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub effects: Vec<Effect>,
    pub narrative: String,
    pub final_damage: u64,
    pub hit: bool,
}

/// Orchestrates sessions, rules and persistence.
pub struct CombatEngine<S: CombatStore> {
    store: S,
    sessions: TurnStateMachine,
    config: RulesConfig,
    rolls: Box<dyn RollSource>,
    retry: RetryPolicy,
}

impl<S: CombatStore> CombatEngine<S> {
    /// Create an engine with entropy-seeded dice and the default retry policy.
    pub fn new(store: S, config: RulesConfig) -> Self {
        Self {
            store,
            sessions: TurnStateMachine::new(),
            config,
            rolls: Box::new(DiceRoller::from_entropy()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_rolls(mut self, rolls: impl RollSource + 'static) -> Self {
        self.rolls = Box::new(rolls);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn into_shared(self) -> SharedEngine<S> {
        Arc::new(Mutex::new(self))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Tear down the engine and hand back its store.
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn sessions(&self) -> &TurnStateMachine {
        &self.sessions
    }

    pub fn session(&self, channel: ChannelId) -> Option<&CombatSession> {
        self.sessions.get(channel)
    }

    pub fn summary(&self, channel: ChannelId) -> Result<SessionSummary, EngineError> {
        self.sessions.summary(channel)
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start combat in `channel` with the given turn order.
    pub fn start_session(
        &mut self,
        channel: ChannelId,
        roster: Vec<CharacterId>,
    ) -> Result<Resolution, EngineError> {
        if self.retry.run("get_session", || self.store.get_session(channel))?.is_some() {
            return Err(EngineError::SessionState(format!(
                "combat is already active in {channel}"
            )));
        }
        for id in &roster {
            self.load_participant(*id)?;
        }

        let resolution = self.sessions.create(channel, roster)?;
        let session = self.sessions.active(channel)?.clone();

        if let Err(e) = self.persist_session(&session, true) {
            warn!(%channel, error = %e, "session creation failed, rolling back");
            self.rollback(channel, None, &[]);
            return Err(e.into());
        }
        Ok(resolution)
    }

    /// Pick up a session the store still holds, e.g. after a restart.
    pub fn restore_session(&mut self, channel: ChannelId) -> Result<(), EngineError> {
        let mut session = self
            .retry
            .run("get_session", || self.store.get_session(channel))?
            .ok_or_else(|| EngineError::SessionState(format!("no stored combat in {channel}")))?;

        for id in session.roster.clone() {
            let state = self
                .retry
                .run("get_combat_bonus_state", || {
                    self.store.get_combat_bonus_state(channel, id)
                })?;
            session.bonuses.insert(id, state);
        }
        self.sessions.restore(session)
    }

    pub fn add_participant(
        &mut self,
        channel: ChannelId,
        character: CharacterId,
    ) -> Result<Resolution, EngineError> {
        self.load_participant(character)?;
        let before = self.sessions.active(channel)?.clone();
        let resolution = self.sessions.add_participant(channel, character)?;
        self.commit(before, &[], &resolution.effects)?;
        Ok(resolution)
    }

    pub fn remove_participant(
        &mut self,
        channel: ChannelId,
        character: CharacterId,
    ) -> Result<Resolution, EngineError> {
        let before = self.sessions.active(channel)?.clone();
        let resolution = self.sessions.remove_participant(channel, character)?;

        let cleared = CombatBonusState::default();
        let result = self.retry.run("save_combat_bonus_state", || {
            self.store.save_combat_bonus_state(channel, character, &cleared)
        });
        if let Err(e) = result {
            warn!(%channel, error = %e, "participant removal failed, rolling back");
            self.rollback(channel, Some(before), &[]);
            return Err(e.into());
        }
        self.commit(before, &[], &resolution.effects)?;
        Ok(resolution)
    }

    /// Finish the current actor's turn: Regeneration, then Zenkai, then
    /// move to the next participant.
    pub fn advance_turn(&mut self, channel: ChannelId) -> Result<Resolution, EngineError> {
        let before = self.sessions.active(channel)?.clone();
        let actor = before
            .current_actor()
            .ok_or_else(|| EngineError::SessionState(format!("no active combat in {channel}")))?;

        let character = self.load_character(actor)?;
        let form = self.load_form(actor)?;
        let resolution = self
            .sessions
            .advance(channel, &character, form.as_ref(), &self.config)?;

        self.commit(before, &[character], &resolution.effects)?;
        Ok(resolution)
    }

    /// End combat in `channel`. Bonuses are zeroed; health and ki stay as they are.
    pub fn end_session(&mut self, channel: ChannelId) -> Result<Resolution, EngineError> {
        let before = self.sessions.active(channel)?.clone();
        let (ended, resolution) = self.sessions.end(channel)?;

        let cleared = CombatBonusState::default();
        let mut result = Ok(());
        for id in &ended.roster {
            result = self.retry.run("save_combat_bonus_state", || {
                self.store.save_combat_bonus_state(channel, *id, &cleared)
            });
            if result.is_err() {
                break;
            }
        }
        let result =
            result.and_then(|_| self.retry.run("end_session", || self.store.end_session(channel)));

        if let Err(e) = result {
            warn!(%channel, error = %e, "session teardown failed, keeping session");
            self.rollback(channel, Some(before), &[]);
            return Err(e.into());
        }
        Ok(resolution)
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Resolve one attack/defense exchange in an active session.
    pub fn resolve_action(&mut self, request: ActionRequest) -> Result<Outcome, EngineError> {
        let channel = request.channel;
        let before = self.sessions.active(channel)?.clone();

        if before.current_actor() != Some(request.actor) {
            return Err(EngineError::SessionState(format!(
                "it is not {}'s turn",
                request.actor
            )));
        }
        if !before.contains(request.target) {
            return Err(EngineError::InvalidTarget(format!(
                "{} is not in combat in {channel}",
                request.target
            )));
        }

        let attacker_mods = parse_modifiers(&request.tokens)?;
        let defender_mods = parse_modifiers(&request.defender_tokens)?;

        let attacker = self.load_character(request.actor)?;
        let attacker_form = self.load_form(request.actor)?;
        let defender = self.load_character(request.target)?;
        let defender_form = self.load_form(request.target)?;

        let outcome = resolve_exchange(
            Combatant::new(&attacker, attacker_form.as_ref(), before.bonus(attacker.id)),
            &attacker_mods,
            Combatant::new(&defender, defender_form.as_ref(), before.bonus(defender.id)),
            &defender_mods,
            ExchangeContext::new(request.kind, request.technique, request.response),
            &self.config,
            self.rolls.as_mut(),
        )?;

        let effects = outcome.resolution.effects;
        self.sessions.apply_bonus_effects(channel, &effects)?;
        self.commit(before, &[attacker, defender], &effects)?;

        info!(
            %channel,
            actor = %request.actor,
            target = %request.target,
            hit = outcome.hit,
            final_damage = outcome.final_damage,
            "action resolved"
        );
        Ok(Outcome {
            effects,
            narrative: outcome.resolution.narrative,
            final_damage: outcome.final_damage,
            hit: outcome.hit,
        })
    }

    /// Switch enhanced regeneration on or off for a character.
    pub fn set_enhanced_regeneration(
        &mut self,
        character: CharacterId,
        active: bool,
    ) -> Result<Resolution, EngineError> {
        let snapshot = self.load_character(character)?;
        let tags = self
            .retry
            .run("get_racial_tags", || self.store.get_racial_tags(character))?;
        if !tags
            .iter()
            .any(|t| t.tag == AbilityTag::EnhancedRegeneration)
        {
            return Err(EngineError::AbilityNotLearned {
                character: snapshot.name,
                ability: AbilityTag::EnhancedRegeneration.to_string(),
            });
        }

        let state = if active { "on" } else { "off" };
        let resolution = Resolution::new(format!(
            "{} turns enhanced regeneration {state}.",
            snapshot.name
        ))
        .with_effect(Effect::EnhancedRegenerationToggled { character, active });

        let mut updated = snapshot;
        apply_effects(std::slice::from_mut(&mut updated), &resolution.effects);
        self.retry
            .run("save_character", || self.store.save_character(&updated))?;
        Ok(resolution)
    }

    /// Current effective stats, including session bonuses when `channel` has
    /// an active session containing the character.
    pub fn effective_stats(
        &self,
        channel: ChannelId,
        character: CharacterId,
    ) -> Result<EffectiveStats, EngineError> {
        let snapshot = self.load_character(character)?;
        let form = self.load_form(character)?;
        let bonus = self
            .sessions
            .get(channel)
            .map(|s| s.bonus(character))
            .unwrap_or_default();
        Ok(compute_effective_stats(
            &snapshot,
            form.as_ref(),
            &bonus,
            &StatDelta::none(),
        ))
    }

    // ========================================================================
    // Store plumbing
    // ========================================================================

    fn load_character(&self, id: CharacterId) -> Result<Character, EngineError> {
        Ok(self.retry.run("get_character", || self.store.get_character(id))?)
    }

    /// Like [`Self::load_character`], but a missing row is a bad target.
    fn load_participant(&self, id: CharacterId) -> Result<Character, EngineError> {
        match self.retry.run("get_character", || self.store.get_character(id)) {
            Err(StoreError::NotFound(_)) => {
                Err(EngineError::InvalidTarget(format!("unknown character {id}")))
            }
            other => Ok(other?),
        }
    }

    fn load_form(&self, id: CharacterId) -> Result<Option<Form>, EngineError> {
        Ok(self
            .retry
            .run("get_active_form", || self.store.get_active_form(id))?)
    }

    fn persist_session(&mut self, session: &CombatSession, create: bool) -> Result<(), StoreError> {
        if create {
            self.retry
                .run("create_session", || self.store.create_session(session))?;
        } else {
            self.retry
                .run("update_session", || self.store.update_session(session))?;
        }
        for (id, state) in &session.bonuses {
            self.retry.run("save_combat_bonus_state", || {
                self.store.save_combat_bonus_state(session.channel, *id, state)
            })?;
        }
        Ok(())
    }

    /// Write changed characters and the session. On failure, everything
    /// goes back to `before` and the original character rows.
    fn commit(
        &mut self,
        before: CombatSession,
        originals: &[Character],
        effects: &[Effect],
    ) -> Result<(), EngineError> {
        let mut updated = originals.to_vec();
        apply_effects(&mut updated, effects);

        let channel = before.channel;
        let result = self.write_characters(originals, &updated).and_then(|_| {
            let session = self.sessions.active(channel).cloned();
            match session {
                Ok(session) => self.persist_session(&session, false),
                Err(_) => Ok(()),
            }
        });

        if let Err(e) = result {
            warn!(%channel, error = %e, "commit failed, rolling back");
            self.rollback(channel, Some(before), originals);
            return Err(e.into());
        }
        Ok(())
    }

    /// Put memory and the store back to `before`. With no `before` the
    /// channel had no session, so any created row is torn down.
    fn rollback(
        &mut self,
        channel: ChannelId,
        before: Option<CombatSession>,
        originals: &[Character],
    ) {
        let restored = match before {
            Some(before) => {
                let stored = self
                    .retry
                    .run("get_session", || self.store.get_session(channel));
                let create = matches!(stored, Ok(None));
                let restored = self.persist_session(&before, create);
                self.sessions.replace(before);
                restored
            }
            None => {
                self.sessions.discard(channel);
                self.retry
                    .run("end_session", || self.store.end_session(channel))
            }
        };
        if let Err(e) = restored {
            warn!(%channel, error = %e, "rollback of session rows failed");
        }

        for original in originals {
            let written = self
                .retry
                .run("save_character", || self.store.save_character(original));
            if let Err(e) = written {
                warn!(character = %original.name, error = %e, "rollback write failed");
            }
        }
    }

    fn write_characters(
        &mut self,
        originals: &[Character],
        updated: &[Character],
    ) -> Result<(), StoreError> {
        for (original, character) in originals.iter().zip(updated) {
            if original != character {
                self.retry
                    .run("save_character", || self.store.save_character(character))?;
            }
        }
        Ok(())
    }
}
