// src/ingest/store.rs
//! Recent-item store seam plus an in-memory backend.
//!
//! The persistence layer is an external collaborator; the trait below is all the
//! pipeline needs from it. `InMemoryItemStore` enforces the same uniqueness rule a
//! real table would: one non-duplicate item per `(owner, content_hash)`.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::ingest::types::{ContentItem, ItemId};

#[async_trait::async_trait]
pub trait RecentItemStore: Send + Sync {
    /// Items of `owner` ingested at or after `since`, most recent first.
    async fn query(&self, owner: &str, since: DateTime<Utc>) -> Result<Vec<ContentItem>, StoreError>;

    /// Persist one item. A non-duplicate whose content hash is already held by
    /// another non-duplicate of the same owner yields `StoreError::Conflict`.
    async fn insert(&self, item: &ContentItem) -> Result<(), StoreError>;

    async fn get(&self, owner: &str, id: ItemId) -> Result<Option<ContentItem>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    inner: RwLock<HashMap<String, OwnerItems>>,
}

#[derive(Debug, Default)]
struct OwnerItems {
    items: Vec<ContentItem>,
    /// content_hash -> id of the non-duplicate holding it.
    hashes: HashMap<String, ItemId>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored items for `owner`, duplicates included.
    pub fn len_for(&self, owner: &str) -> usize {
        self.inner
            .read()
            .map(|g| g.get(owner).map_or(0, |o| o.items.len()))
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl RecentItemStore for InMemoryItemStore {
    async fn query(&self, owner: &str, since: DateTime<Utc>) -> Result<Vec<ContentItem>, StoreError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::unavailable("item store lock poisoned"))?;
        let Some(bucket) = guard.get(owner) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<ContentItem> = bucket
            .items
            .iter()
            .filter(|it| it.ingested_at >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn insert(&self, item: &ContentItem) -> Result<(), StoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::unavailable("item store lock poisoned"))?;
        let bucket = guard.entry(item.owner_id.clone()).or_default();
        if !item.is_duplicate {
            if let Some(&existing) = bucket.hashes.get(&item.content_hash) {
                return Err(StoreError::Conflict { existing });
            }
            bucket.hashes.insert(item.content_hash.clone(), item.id);
        }
        bucket.items.push(item.clone());
        Ok(())
    }

    async fn get(&self, owner: &str, id: ItemId) -> Result<Option<ContentItem>, StoreError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::unavailable("item store lock poisoned"))?;
        Ok(guard
            .get(owner)
            .and_then(|b| b.items.iter().find(|it| it.id == id).cloned()))
    }
}
