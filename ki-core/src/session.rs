//! Per-channel combat sessions and the turn state machine.
//!
//! A channel moves through `NoSession → Active → Ended`. The
//! [`TurnStateMachine`] owns every active [`CombatSession`], keyed by
//! channel, and is the only way to create, advance or end one. Ending a
//! session removes it from the map so the channel is free again.

use crate::character::{Character, CharacterId, ChannelId, Form};
use crate::config::RulesConfig;
use crate::racial;
use crate::rules::{Effect, EngineError, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Session-scoped bonuses for one participant. Zeroed when combat ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CombatBonusState {
    pub zenkai_bonus: u64,
    pub majin_magic_bonus: u64,
    /// Effective PL of the last opponent faced in a resolved exchange.
    pub last_attacker_pl: u64,
}

impl CombatBonusState {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Ended,
}

/// An ongoing combat encounter in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatSession {
    pub channel: ChannelId,
    /// Participants in turn order.
    pub roster: Vec<CharacterId>,
    pub turn_index: usize,
    pub round: u32,
    pub bonuses: HashMap<CharacterId, CombatBonusState>,
    pub status: SessionStatus,
}

impl CombatSession {
    fn new(channel: ChannelId, roster: Vec<CharacterId>) -> Self {
        let bonuses = roster
            .iter()
            .map(|id| (*id, CombatBonusState::default()))
            .collect();
        Self {
            channel,
            roster,
            turn_index: 0,
            round: 1,
            bonuses,
            status: SessionStatus::Active,
        }
    }

    pub fn current_actor(&self) -> Option<CharacterId> {
        self.roster.get(self.turn_index).copied()
    }

    pub fn contains(&self, character: CharacterId) -> bool {
        self.roster.contains(&character)
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Bonus state for a participant; zeroed for anyone not in the session.
    pub fn bonus(&self, character: CharacterId) -> CombatBonusState {
        self.bonuses.get(&character).copied().unwrap_or_default()
    }

    /// Move the turn pointer. Wrapping to the top of the roster starts a new round.
    pub fn next_turn(&mut self) {
        self.turn_index += 1;
        if self.turn_index >= self.roster.len() {
            self.turn_index = 0;
            self.round += 1;
        }
    }

    /// Fold bonus effects into the per-participant state. Other effects are ignored.
    pub fn apply_bonus_effects(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::ZenkaiGained {
                    character,
                    new_total,
                    ..
                } => {
                    if let Some(bonus) = self.bonuses.get_mut(character) {
                        bonus.zenkai_bonus = *new_total;
                    }
                }
                Effect::MajinMagicTriggered {
                    character,
                    new_bonus,
                    ..
                } => {
                    if let Some(bonus) = self.bonuses.get_mut(character) {
                        bonus.majin_magic_bonus = *new_bonus;
                    }
                }
                Effect::OpponentRecorded {
                    character,
                    opponent_pl,
                } => {
                    if let Some(bonus) = self.bonuses.get_mut(character) {
                        bonus.last_attacker_pl = *opponent_pl;
                    }
                }
                Effect::BonusesCleared { character, .. } => {
                    if let Some(bonus) = self.bonuses.get_mut(character) {
                        bonus.clear();
                    }
                }
                _ => {}
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            channel: self.channel,
            round: self.round,
            current_actor: self.current_actor(),
            participants: self.roster.len(),
            status: self.status,
        }
    }
}

/// A compact view of a session for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub channel: ChannelId,
    pub round: u32,
    pub current_actor: Option<CharacterId>,
    pub participants: usize,
    pub status: SessionStatus,
}

/// Owns every active session, one per channel.
#[derive(Debug, Clone, Default)]
pub struct TurnStateMachine {
    sessions: HashMap<ChannelId, CombatSession>,
}

impl TurnStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: ChannelId) -> Option<&CombatSession> {
        self.sessions.get(&channel)
    }

    /// The active session in `channel`, or a session error.
    pub fn active(&self, channel: ChannelId) -> Result<&CombatSession, EngineError> {
        self.sessions
            .get(&channel)
            .filter(|s| s.is_active())
            .ok_or_else(|| no_session(channel))
    }

    fn active_mut(&mut self, channel: ChannelId) -> Result<&mut CombatSession, EngineError> {
        self.sessions
            .get_mut(&channel)
            .filter(|s| s.is_active())
            .ok_or_else(|| no_session(channel))
    }

    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.sessions.keys().copied()
    }

    /// Start combat in `channel` with the given turn order.
    pub fn create(
        &mut self,
        channel: ChannelId,
        roster: Vec<CharacterId>,
    ) -> Result<Resolution, EngineError> {
        if self.sessions.contains_key(&channel) {
            return Err(EngineError::SessionState(format!(
                "combat is already active in {channel}"
            )));
        }
        if roster.is_empty() {
            return Err(EngineError::SessionState(
                "cannot start combat without participants".to_string(),
            ));
        }
        for (i, id) in roster.iter().enumerate() {
            if roster[..i].contains(id) {
                return Err(EngineError::SessionState(format!(
                    "{id} appears twice in the roster"
                )));
            }
        }

        let session = CombatSession::new(channel, roster.clone());
        info!(%channel, participants = roster.len(), "combat session started");
        self.sessions.insert(channel, session);

        Ok(Resolution::new(format!("Combat begins in {channel}!"))
            .with_effect(Effect::SessionStarted { channel, roster }))
    }

    /// Re-register a session loaded from the store.
    pub fn restore(&mut self, session: CombatSession) -> Result<(), EngineError> {
        if !session.is_active() {
            return Err(EngineError::SessionState(format!(
                "session in {} has already ended",
                session.channel
            )));
        }
        if self.sessions.contains_key(&session.channel) {
            return Err(EngineError::SessionState(format!(
                "combat is already active in {}",
                session.channel
            )));
        }
        if session.roster.is_empty() || session.turn_index >= session.roster.len() {
            return Err(EngineError::SessionState(format!(
                "session in {} has an invalid turn pointer",
                session.channel
            )));
        }
        info!(channel = %session.channel, round = session.round, "combat session restored");
        self.sessions.insert(session.channel, session);
        Ok(())
    }

    /// Put back a snapshot taken before a failed commit.
    pub(crate) fn replace(&mut self, session: CombatSession) {
        self.sessions.insert(session.channel, session);
    }

    /// Drop a session whose creation could not be persisted.
    pub(crate) fn discard(&mut self, channel: ChannelId) -> Option<CombatSession> {
        self.sessions.remove(&channel)
    }

    /// Add a participant at the end of the turn order.
    pub fn add_participant(
        &mut self,
        channel: ChannelId,
        character: CharacterId,
    ) -> Result<Resolution, EngineError> {
        let session = self.active_mut(channel)?;
        if session.contains(character) {
            return Err(EngineError::SessionState(format!(
                "{character} is already in combat in {channel}"
            )));
        }
        session.roster.push(character);
        session
            .bonuses
            .insert(character, CombatBonusState::default());
        info!(%channel, %character, "participant joined");

        Ok(Resolution::new(format!("A new fighter joins the combat in {channel}."))
            .with_effect(Effect::ParticipantAdded { channel, character }))
    }

    /// Remove a participant. The current actor keeps the turn unless it is
    /// the one leaving, in which case the next in order takes over.
    pub fn remove_participant(
        &mut self,
        channel: ChannelId,
        character: CharacterId,
    ) -> Result<Resolution, EngineError> {
        let session = self.active_mut(channel)?;
        let position = session
            .roster
            .iter()
            .position(|id| *id == character)
            .ok_or_else(|| {
                EngineError::InvalidTarget(format!("{character} is not in combat in {channel}"))
            })?;
        if session.roster.len() == 1 {
            return Err(EngineError::SessionState(
                "cannot remove the last participant; end the session instead".to_string(),
            ));
        }

        session.roster.remove(position);
        session.bonuses.remove(&character);
        if position < session.turn_index {
            session.turn_index -= 1;
        }
        if session.turn_index >= session.roster.len() {
            session.turn_index = 0;
        }
        info!(%channel, %character, "participant left");

        Ok(Resolution::new(format!("A fighter leaves the combat in {channel}."))
            .with_effect(Effect::BonusesCleared { channel, character })
            .with_effect(Effect::ParticipantRemoved { channel, character }))
    }

    /// Finish `completed`'s turn: run Regeneration then Zenkai for it, fold
    /// the bonus effects into the session and move the turn pointer.
    ///
    /// Health and ki effects are returned for the caller to commit.
    pub fn advance(
        &mut self,
        channel: ChannelId,
        completed: &Character,
        form: Option<&Form>,
        config: &RulesConfig,
    ) -> Result<Resolution, EngineError> {
        let session = self.active_mut(channel)?;
        let current = session.current_actor().ok_or_else(|| no_session(channel))?;
        if current != completed.id {
            return Err(EngineError::SessionState(format!(
                "it is not {}'s turn",
                completed.name
            )));
        }

        let effects = racial::end_of_turn(completed, form, &session.bonus(completed.id), config);
        session.apply_bonus_effects(&effects);
        session.next_turn();
        let next = session.current_actor().unwrap_or(completed.id);
        info!(%channel, round = session.round, completed = %completed.name, "turn advanced");

        Ok(Resolution::new(format!(
            "{}'s turn ends. Round {}.",
            completed.name, session.round
        ))
        .with_effects(effects)
        .with_effect(Effect::TurnAdvanced {
            channel,
            round: session.round,
            completed: completed.id,
            next,
        }))
    }

    /// Fold resolver bonus effects into the active session in `channel`.
    pub fn apply_bonus_effects(
        &mut self,
        channel: ChannelId,
        effects: &[Effect],
    ) -> Result<(), EngineError> {
        self.active_mut(channel)?.apply_bonus_effects(effects);
        Ok(())
    }

    /// End combat: zero every participant's bonuses and free the channel.
    ///
    /// Returns the final session state alongside the teardown effects.
    pub fn end(&mut self, channel: ChannelId) -> Result<(CombatSession, Resolution), EngineError> {
        self.active(channel)?;
        let mut session = self
            .sessions
            .remove(&channel)
            .ok_or_else(|| no_session(channel))?;

        let mut resolution = Resolution::new(format!(
            "Combat in {channel} ends after {} rounds.",
            session.round
        ));
        for character in &session.roster {
            resolution.effects.push(Effect::BonusesCleared {
                channel,
                character: *character,
            });
        }
        resolution.effects.push(Effect::SessionEnded {
            channel,
            rounds: session.round,
        });

        session.apply_bonus_effects(&resolution.effects);
        session.status = SessionStatus::Ended;
        info!(%channel, rounds = session.round, "combat session ended");
        Ok((session, resolution))
    }

    pub fn summary(&self, channel: ChannelId) -> Result<SessionSummary, EngineError> {
        self.active(channel).map(CombatSession::summary)
    }
}

fn no_session(channel: ChannelId) -> EngineError {
    EngineError::SessionState(format!("no active combat in {channel}"))
}
