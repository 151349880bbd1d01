// src/lib.rs
// Public library surface for the batch runner and integration tests.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod digest;
pub mod error;
pub mod fingerprint;
pub mod ingest;
mod locks;
pub mod metrics;
pub mod pipeline;
pub mod preferences;
pub mod rank;

// ---- Re-exports for stable public API ----
pub use crate::config::PipelineConfig;
pub use crate::dedup::{DedupConfig, DedupReport, Deduplicator, DuplicateStage};
pub use crate::digest::{DigestConfig, DigestSelection, DigestSelector};
pub use crate::ingest::canonicalize;
pub use crate::ingest::types::{ContentItem, ContentType, FetchedItem, ItemId, Topic};
pub use crate::pipeline::DigestPipeline;
pub use crate::preferences::{FeedbackAction, PreferenceStore, PreferenceType};
pub use crate::rank::{RankingEngine, ScoredItem, UserProfile};
