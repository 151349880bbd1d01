// src/ingest/types.rs
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Integer identity of a stored item. Duplicates point at their original by id,
/// never by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id allocator shared by everything that creates `ContentItem`s.
#[derive(Debug)]
pub struct IdSequence {
    next: AtomicU64,
}

impl IdSequence {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.max(1)),
        }
    }

    pub fn next_id(&self) -> ItemId {
        ItemId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    News,
    Blog,
    Social,
    Video,
    Podcast,
    Academic,
}

/// Extracted topic with the extractor's confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Topic {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// Raw item as emitted by the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedItem {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default = "default_importance")]
    pub importance_score: f32,
    #[serde(default)]
    pub engagement_score: f32,
}

fn default_importance() -> f32 {
    0.5
}

/// Item after fingerprinting. Hashes are set once; the duplicate flag is set once
/// by the deduplicator and never rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub owner_id: String,
    pub source_id: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    /// When the pipeline accepted the item; the recency window is measured on this.
    pub ingested_at: DateTime<Utc>,
    pub content_hash: String,
    pub fuzzy_hash: String,
    pub topics: Vec<Topic>,
    pub author: Option<String>,
    pub content_type: ContentType,
    pub importance_score: f32,
    pub engagement_score: f32,
    pub is_duplicate: bool,
    pub duplicate_of: Option<ItemId>,
}

impl ContentItem {
    pub fn from_fetched(
        id: ItemId,
        fetched: FetchedItem,
        ingested_at: DateTime<Utc>,
        content_hash: String,
        fuzzy_hash: String,
    ) -> Self {
        Self {
            id,
            owner_id: fetched.owner_id,
            source_id: fetched.source_id,
            title: fetched.title,
            body: fetched.body,
            url: fetched.url,
            published_at: fetched.published_at,
            ingested_at,
            content_hash,
            fuzzy_hash,
            topics: fetched
                .topics
                .into_iter()
                .map(|t| Topic::new(t.name, t.confidence))
                .collect(),
            author: fetched.author.filter(|a| !a.trim().is_empty()),
            content_type: fetched.content_type,
            importance_score: sanitize01(fetched.importance_score),
            engagement_score: if fetched.engagement_score.is_finite() {
                fetched.engagement_score.max(0.0)
            } else {
                0.0
            },
            is_duplicate: false,
            duplicate_of: None,
        }
    }

    /// Flag this item as a duplicate of `original`. Only valid on a fresh item.
    pub(crate) fn mark_duplicate_of(&mut self, original: ItemId) {
        debug_assert!(!self.is_duplicate, "duplicate decision is final");
        self.is_duplicate = true;
        self.duplicate_of = Some(original);
    }

    /// Number of whitespace-separated words in the body.
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }

    pub fn topic_names(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|t| t.name.as_str())
    }
}

fn sanitize01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
