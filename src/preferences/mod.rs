//! # Preference learning
//!
//! Per-user scores in `[-1, 1]` keyed by `(user, kind, key)`, evolved by an
//! exponential moving average whose learning rate decays with the number of
//! interactions: `lr = min(1, 10 / total)`. Early feedback moves a score quickly,
//! mature preferences settle.
//!
//! Writes to one key are serialized twice over: a per-key async lock inside the
//! process, and a version compare-and-set against the backend for writers that
//! bypass the lock (other processes sharing a backend). A lost CAS is retried
//! with a fresh read, never dropped.

pub mod feedback;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PreferenceError;
use crate::locks::KeyedLocks;
use crate::metrics as m;

pub use feedback::FeedbackAction;

/// Saved-write attempts before a key is reported as conflicted.
pub const MAX_WRITE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceType {
    Topic,
    Source,
    Author,
}

impl PreferenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Source => "source",
            Self::Author => "author",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreferenceKey {
    pub user_id: String,
    pub kind: PreferenceType,
    pub key: String,
}

impl PreferenceKey {
    pub fn new(user_id: impl Into<String>, kind: PreferenceType, key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.kind.as_str(), self.key)
    }
}

/// Stored state of one preference. `version` increases by one per saved write.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PreferenceEntry {
    pub score: f32,
    pub positive_interactions: u32,
    pub negative_interactions: u32,
    pub version: u64,
}

impl PreferenceEntry {
    pub fn total_interactions(&self) -> u32 {
        self.positive_interactions + self.negative_interactions
    }

    /// Entry after one more interaction. `weight` in `[0, 1]` scales the
    /// learning rate; 1.0 is a full-strength event.
    pub fn updated(&self, is_positive: bool, weight: f32) -> Self {
        let mut next = *self;
        if is_positive {
            next.positive_interactions += 1;
        } else {
            next.negative_interactions += 1;
        }
        let total = next.total_interactions() as f32;
        let weight = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
        let learning_rate = (10.0 / total).min(1.0) * weight;
        let raw = (next.positive_interactions as f32 - next.negative_interactions as f32) / total;
        next.score = (self.score * (1.0 - learning_rate) + raw * learning_rate).clamp(-1.0, 1.0);
        next.version = self.version + 1;
        next
    }
}

/// Persistence seam for preference entries.
#[async_trait::async_trait]
pub trait PreferenceBackend: Send + Sync {
    async fn load(&self, key: &PreferenceKey) -> Result<Option<PreferenceEntry>, PreferenceError>;

    /// Store `entry` only if the stored version still equals `expected_version`
    /// (0 for "absent"). Returns `false` when another writer got there first.
    async fn save(
        &self,
        key: &PreferenceKey,
        entry: PreferenceEntry,
        expected_version: u64,
    ) -> Result<bool, PreferenceError>;

    async fn list(&self, user_id: &str) -> Result<Vec<(PreferenceKey, PreferenceEntry)>, PreferenceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPreferenceBackend {
    entries: RwLock<HashMap<PreferenceKey, PreferenceEntry>>,
}

impl InMemoryPreferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> PreferenceError {
    PreferenceError::Backend(anyhow::anyhow!("preference map lock poisoned"))
}

#[async_trait::async_trait]
impl PreferenceBackend for InMemoryPreferenceBackend {
    async fn load(&self, key: &PreferenceKey) -> Result<Option<PreferenceEntry>, PreferenceError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).copied())
    }

    async fn save(
        &self,
        key: &PreferenceKey,
        entry: PreferenceEntry,
        expected_version: u64,
    ) -> Result<bool, PreferenceError> {
        let mut guard = self.entries.write().map_err(poisoned)?;
        let current = guard.get(key).map_or(0, |e| e.version);
        if current != expected_version {
            return Ok(false);
        }
        guard.insert(key.clone(), entry);
        Ok(true)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<(PreferenceKey, PreferenceEntry)>, PreferenceError> {
        let guard = self.entries.read().map_err(poisoned)?;
        let mut out: Vec<_> = guard
            .iter()
            .filter(|(k, _)| k.user_id == user_id)
            .map(|(k, e)| (k.clone(), *e))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

/// Read-only snapshot of one user's scores, used by a ranking pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreferenceProfile {
    pub user_id: String,
    pub topics: HashMap<String, f32>,
    pub sources: HashMap<String, f32>,
    pub authors: HashMap<String, f32>,
}

impl PreferenceProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn score(&self, kind: PreferenceType, key: &str) -> f32 {
        self.map(kind).get(key).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, kind: PreferenceType, key: impl Into<String>, score: f32) {
        let score = if score.is_nan() { 0.0 } else { score.clamp(-1.0, 1.0) };
        self.map_mut(kind).insert(key.into(), score);
    }

    fn map(&self, kind: PreferenceType) -> &HashMap<String, f32> {
        match kind {
            PreferenceType::Topic => &self.topics,
            PreferenceType::Source => &self.sources,
            PreferenceType::Author => &self.authors,
        }
    }

    fn map_mut(&mut self, kind: PreferenceType) -> &mut HashMap<String, f32> {
        match kind {
            PreferenceType::Topic => &mut self.topics,
            PreferenceType::Source => &mut self.sources,
            PreferenceType::Author => &mut self.authors,
        }
    }
}

pub struct PreferenceStore {
    backend: Arc<dyn PreferenceBackend>,
    key_locks: KeyedLocks<PreferenceKey>,
}

impl fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceStore").finish_non_exhaustive()
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryPreferenceBackend::new()))
    }
}

impl PreferenceStore {
    pub fn new(backend: Arc<dyn PreferenceBackend>) -> Self {
        m::ensure_metrics_described();
        Self {
            backend,
            key_locks: KeyedLocks::default(),
        }
    }

    /// Current score, 0 when the key has never seen feedback.
    pub async fn score(
        &self,
        user_id: &str,
        kind: PreferenceType,
        key: &str,
    ) -> Result<f32, PreferenceError> {
        let k = PreferenceKey::new(user_id, kind, key);
        Ok(self.backend.load(&k).await?.map_or(0.0, |e| e.score))
    }

    pub async fn entry(&self, key: &PreferenceKey) -> Result<Option<PreferenceEntry>, PreferenceError> {
        self.backend.load(key).await
    }

    /// Apply one interaction and return the saved entry.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        kind: PreferenceType,
        key: &str,
        is_positive: bool,
        weight: f32,
    ) -> Result<PreferenceEntry, PreferenceError> {
        let k = PreferenceKey::new(user_id, kind, key);
        let _serial = self.key_locks.lock(&k).await;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.backend.load(&k).await?.unwrap_or_default();
            let next = current.updated(is_positive, weight);
            if self.backend.save(&k, next, current.version).await? {
                counter!(m::PREFERENCE_UPDATES_TOTAL, "kind" => kind.as_str()).increment(1);
                debug!(target: "preferences", key = %k, score = next.score, attempt, "preference updated");
                return Ok(next);
            }
            counter!(m::PREFERENCE_CONFLICTS_TOTAL).increment(1);
            debug!(target: "preferences", key = %k, attempt, "stale version; re-reading");
        }
        warn!(target: "preferences", key = %k, attempts = MAX_WRITE_ATTEMPTS, "preference write kept conflicting");
        Err(PreferenceError::WriteConflict {
            key: k,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    /// Snapshot all of a user's scores for one ranking pass.
    pub async fn profile(&self, user_id: &str) -> Result<PreferenceProfile, PreferenceError> {
        let mut profile = PreferenceProfile::new(user_id);
        for (k, e) in self.backend.list(user_id).await? {
            profile.set(k.kind, k.key, e.score);
        }
        Ok(profile)
    }
}
