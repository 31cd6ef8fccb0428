//! The row store boundary.
//!
//! The engine reads and writes characters, forms, sessions and bonus state
//! through the narrow [`CombatStore`] trait. [`MemoryStore`] is the
//! in-process implementation used by tests and small deployments; it can be
//! snapshotted to JSON and loaded back.

use crate::character::{Character, CharacterId, ChannelId, Form, RacialTag};
use crate::session::{CombatBonusState, CombatSession};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A failure worth retrying (lock contention, dropped connection).
    #[error("Transient store failure: {0}")]
    Transient(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

/// Storage operations the engine depends on.
pub trait CombatStore: Send {
    fn get_character(&self, id: CharacterId) -> Result<Character, StoreError>;

    /// Persist health, ki and ability toggles.
    fn save_character(&mut self, character: &Character) -> Result<(), StoreError>;

    fn get_active_form(&self, character: CharacterId) -> Result<Option<Form>, StoreError>;

    fn get_combat_bonus_state(
        &self,
        channel: ChannelId,
        character: CharacterId,
    ) -> Result<CombatBonusState, StoreError>;

    fn save_combat_bonus_state(
        &mut self,
        channel: ChannelId,
        character: CharacterId,
        state: &CombatBonusState,
    ) -> Result<(), StoreError>;

    fn get_session(&self, channel: ChannelId) -> Result<Option<CombatSession>, StoreError>;

    fn create_session(&mut self, session: &CombatSession) -> Result<(), StoreError>;

    fn update_session(&mut self, session: &CombatSession) -> Result<(), StoreError>;

    /// Remove the session row and zero its bonus rows.
    fn end_session(&mut self, channel: ChannelId) -> Result<(), StoreError>;

    fn get_racial_tags(&self, character: CharacterId) -> Result<Vec<RacialTag>, StoreError>;
}

// ============================================================================
// Retry
// ============================================================================

/// Bounded retry for transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Run `op`, retrying on [`StoreError::Transient`] up to `max_attempts` times.
    pub fn run<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut attempt = 1;
        loop {
            match op() {
                Err(StoreError::Transient(reason)) if attempt < self.max_attempts => {
                    warn!(operation, attempt, %reason, "transient store failure, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Current snapshot file version.
const SNAPSHOT_VERSION: u32 = 1;

/// An in-memory [`CombatStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    characters: HashMap<CharacterId, Character>,
    /// Form catalog keyed by form name.
    forms: HashMap<String, Form>,
    sessions: HashMap<ChannelId, CombatSession>,
    bonuses: HashMap<(ChannelId, CharacterId), CombatBonusState>,
    /// Number of upcoming calls that fail with a transient error.
    failures: AtomicU32,
    /// Same, counted only on writes.
    write_failures: AtomicU32,
    /// One-shot write failures by operation: successes left before the failure.
    scheduled: Mutex<HashMap<&'static str, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_character(&mut self, character: Character) {
        self.characters.insert(character.id, character);
    }

    pub fn insert_form(&mut self, form: Form) {
        self.forms.insert(form.name.clone(), form);
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    /// Make the next `n` store calls fail with [`StoreError::Transient`].
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes fail with [`StoreError::Transient`].
    pub fn fail_next_writes(&self, n: u32) {
        self.write_failures.store(n, Ordering::SeqCst);
    }

    /// Let `successes` calls of the write `operation` through, then fail the
    /// next one with [`StoreError::Transient`].
    pub fn fail_after(&self, operation: &'static str, successes: u32) {
        self.scheduled_failures().insert(operation, successes);
    }

    fn scheduled_failures(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, u32>> {
        self.scheduled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_failure(&self, operation: &str) -> Result<(), StoreError> {
        take_failure(&self.failures, operation)
    }

    fn check_write_failure(&self, operation: &str) -> Result<(), StoreError> {
        take_failure(&self.failures, operation)?;
        take_failure(&self.write_failures, operation)?;

        let mut scheduled = self.scheduled_failures();
        match scheduled.get_mut(operation) {
            Some(0) => {
                scheduled.remove(operation);
                Err(StoreError::Transient(format!("{operation} unavailable")))
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Write every row to a JSON snapshot.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let snapshot = StoreSnapshot::capture(self);
        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load a store from a JSON snapshot.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).await?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        snapshot.into_store()
    }
}

impl CombatStore for MemoryStore {
    fn get_character(&self, id: CharacterId) -> Result<Character, StoreError> {
        self.check_failure("get_character")?;
        self.characters
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("character {id}")))
    }

    fn save_character(&mut self, character: &Character) -> Result<(), StoreError> {
        self.check_write_failure("save_character")?;
        self.characters.insert(character.id, character.clone());
        Ok(())
    }

    fn get_active_form(&self, character: CharacterId) -> Result<Option<Form>, StoreError> {
        self.check_failure("get_active_form")?;
        let character = self
            .characters
            .get(&character)
            .ok_or_else(|| StoreError::NotFound(format!("character {character}")))?;
        match &character.active_form {
            None => Ok(None),
            Some(name) => self
                .forms
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| StoreError::NotFound(format!("form {name}"))),
        }
    }

    fn get_combat_bonus_state(
        &self,
        channel: ChannelId,
        character: CharacterId,
    ) -> Result<CombatBonusState, StoreError> {
        self.check_failure("get_combat_bonus_state")?;
        Ok(self
            .bonuses
            .get(&(channel, character))
            .copied()
            .unwrap_or_default())
    }

    fn save_combat_bonus_state(
        &mut self,
        channel: ChannelId,
        character: CharacterId,
        state: &CombatBonusState,
    ) -> Result<(), StoreError> {
        self.check_write_failure("save_combat_bonus_state")?;
        self.bonuses.insert((channel, character), *state);
        Ok(())
    }

    fn get_session(&self, channel: ChannelId) -> Result<Option<CombatSession>, StoreError> {
        self.check_failure("get_session")?;
        Ok(self.sessions.get(&channel).cloned())
    }

    fn create_session(&mut self, session: &CombatSession) -> Result<(), StoreError> {
        self.check_write_failure("create_session")?;
        self.sessions.insert(session.channel, session.clone());
        Ok(())
    }

    fn update_session(&mut self, session: &CombatSession) -> Result<(), StoreError> {
        self.check_write_failure("update_session")?;
        match self.sessions.get_mut(&session.channel) {
            Some(row) => {
                *row = session.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("session in {}", session.channel))),
        }
    }

    fn end_session(&mut self, channel: ChannelId) -> Result<(), StoreError> {
        self.check_write_failure("end_session")?;
        self.sessions.remove(&channel);
        for ((row_channel, _), state) in self.bonuses.iter_mut() {
            if *row_channel == channel {
                state.clear();
            }
        }
        Ok(())
    }

    fn get_racial_tags(&self, character: CharacterId) -> Result<Vec<RacialTag>, StoreError> {
        self.check_failure("get_racial_tags")?;
        self.characters
            .get(&character)
            .map(|c| c.racial_tags.clone())
            .ok_or_else(|| StoreError::NotFound(format!("character {character}")))
    }
}

fn take_failure(counter: &AtomicU32, operation: &str) -> Result<(), StoreError> {
    let pending = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    match pending {
        Ok(_) => Err(StoreError::Transient(format!("{operation} unavailable"))),
        Err(_) => Ok(()),
    }
}

/// A bonus row, flattened for JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BonusRow {
    channel: ChannelId,
    character: CharacterId,
    state: CombatBonusState,
}

/// On-disk form of a [`MemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    characters: Vec<Character>,
    forms: Vec<Form>,
    sessions: Vec<CombatSession>,
    bonuses: Vec<BonusRow>,
}

impl StoreSnapshot {
    fn capture(store: &MemoryStore) -> Self {
        let mut characters: Vec<Character> = store.characters.values().cloned().collect();
        characters.sort_by_key(|c| c.id);
        let mut forms: Vec<Form> = store.forms.values().cloned().collect();
        forms.sort_by(|a, b| a.name.cmp(&b.name));
        let mut sessions: Vec<CombatSession> = store.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.channel);
        let mut bonuses: Vec<BonusRow> = store
            .bonuses
            .iter()
            .map(|((channel, character), state)| BonusRow {
                channel: *channel,
                character: *character,
                state: *state,
            })
            .collect();
        bonuses.sort_by_key(|row| (row.channel, row.character));

        Self {
            version: SNAPSHOT_VERSION,
            characters,
            forms,
            sessions,
            bonuses,
        }
    }

    fn into_store(self) -> Result<MemoryStore, StoreError> {
        let mut store = MemoryStore::new();
        for character in self.characters {
            if store.characters.contains_key(&character.id) {
                return Err(StoreError::InvalidFormat(format!(
                    "duplicate character {}",
                    character.id
                )));
            }
            store.insert_character(character);
        }
        for form in self.forms {
            store.insert_form(form);
        }
        for session in self.sessions {
            store.sessions.insert(session.channel, session);
        }
        for row in self.bonuses {
            store.bonuses.insert((row.channel, row.character), row.state);
        }
        Ok(store)
    }
}
