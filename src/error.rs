//! Error taxonomy of the curation pipeline.
//!
//! Only per-item failures travel through these types; none of them is allowed to
//! abort a whole user batch. Callers decide fail-open vs. retry by variant.

use thiserror::Error;

use crate::ingest::types::ItemId;
use crate::preferences::PreferenceKey;

/// Failure of the recent-item store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query or insert failed for a reason that may go away on retry.
    #[error("recent-item store unavailable: {0:#}")]
    Unavailable(#[source] anyhow::Error),
    /// `(owner, content_hash)` already taken by a non-duplicate item.
    #[error("content hash already stored as item {existing}")]
    Conflict { existing: ItemId },
}

impl StoreError {
    pub fn unavailable(msg: impl std::fmt::Display) -> Self {
        Self::Unavailable(anyhow::anyhow!("{msg}"))
    }
}

#[derive(Debug, Error)]
pub enum DedupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Hash or similarity computation failed on one item.
    #[error("fingerprint computation failed: {0}")]
    Computation(String),
    #[error("deduplication cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum PreferenceError {
    /// Another writer kept winning the compare-and-set on the same key.
    #[error("preference write conflict on {key} after {attempts} attempts")]
    WriteConflict { key: PreferenceKey, attempts: u32 },
    #[error("preference backend failure: {0:#}")]
    Backend(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("item {item}: factor `{factor}` is not finite")]
    NonFinite { item: ItemId, factor: &'static str },
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("item {0} not found for owner")]
    UnknownItem(ItemId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Preference(#[from] PreferenceError),
}
