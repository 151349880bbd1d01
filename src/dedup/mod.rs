//! # Deduplication
//!
//! Per-owner cascade deciding, for each fetched item, between *unique* and
//! *duplicate of X*. Stages run in order and stop at the first match:
//!
//! 1. in-batch URL / content hash (items accepted earlier in the same batch)
//! 2. URL exact match against the recent window
//! 3. content-hash exact match
//! 4. title similarity (bounded candidate list)
//! 5. body similarity, fuzzy-hash pre-filtered (bounded candidate list)
//!
//! The store's `(owner, content_hash)` uniqueness is the authoritative guard;
//! the cascade is the fast path in front of it. Every failure inside the cascade
//! fails open: the item is kept as unique and the failure is logged.

pub mod stats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::error::{DedupError, StoreError};
use crate::fingerprint::{self, short_id, Fingerprint};
use crate::ingest::canonicalize;
use crate::ingest::store::RecentItemStore;
use crate::ingest::types::{ContentItem, FetchedItem, IdSequence, ItemId};
use crate::locks::KeyedLocks;
use crate::metrics as m;

pub use stats::{dedup_stats, DedupStats};

/// Cached verdicts read `unique:<id>`: no window item up to `<id>` is similar.
const UNIQUE_VERDICT: &str = "unique";

/// Compares two canonical bodies against a threshold.
type BodyMatcher = fn(&str, &str, f32) -> bool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Recency window, in days, every stage is scoped to.
    pub window_days: u32,
    pub title_threshold: f32,
    pub content_threshold: f32,
    pub fuzzy_threshold: f32,
    pub title_candidates: usize,
    pub body_candidates: usize,
    /// Titles shorter than this skip the title stage.
    pub min_title_chars: usize,
    /// Bodies shorter than this skip (and never serve as candidates for) the body stage.
    pub min_body_chars: usize,
    pub verdict_ttl_secs: u64,
    pub store_retry_backoff_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            title_threshold: 0.9,
            content_threshold: 0.85,
            fuzzy_threshold: fingerprint::DEFAULT_FUZZY_THRESHOLD,
            title_candidates: 100,
            body_candidates: 50,
            min_title_chars: 10,
            min_body_chars: 100,
            verdict_ttl_secs: 3600,
            store_retry_backoff_ms: 50,
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::days(i64::from(self.window_days))
    }

    fn retry_backoff(&self) -> StdDuration {
        StdDuration::from_millis(self.store_retry_backoff_ms)
    }
}

/// Which check identified a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStage {
    BatchUrl,
    BatchHash,
    UrlExact,
    ContentHash,
    TitleSimilar,
    ContentSimilar,
}

impl DuplicateStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BatchUrl => "batch_url",
            Self::BatchHash => "batch_hash",
            Self::UrlExact => "url_exact",
            Self::ContentHash => "content_hash",
            Self::TitleSimilar => "title_similar",
            Self::ContentSimilar => "content_similar",
        }
    }
}

/// Terminal outcome of the cascade for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum DedupDecision {
    Unique,
    Duplicate { original: ItemId, stage: DuplicateStage },
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateItem {
    pub item: ContentItem,
    pub stage: DuplicateStage,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupReport {
    /// Unique items in batch order, hashes set.
    pub unique: Vec<ContentItem>,
    /// Flagged items, each pointing at its original.
    pub duplicates: Vec<DuplicateItem>,
    /// Items accepted as unique because a check or insert failed.
    pub fail_open: usize,
    /// The recent window could not be loaded; only in-batch checks ran.
    pub window_degraded: bool,
    /// Items whose `owner_id` did not match the batch owner; not processed.
    pub skipped_foreign: usize,
    /// Cancellation stopped the batch before every item was decided.
    pub cancelled: bool,
    /// Id given to each input position; `None` for foreign or undecided items.
    pub assigned: Vec<Option<ItemId>>,
}

impl DedupReport {
    pub fn processed(&self) -> usize {
        self.unique.len() + self.duplicates.len()
    }
}

/// Comparable view of one non-duplicate item inside the recent window.
#[derive(Debug)]
struct WindowEntry {
    id: ItemId,
    url: String,
    content_hash: String,
    fuzzy_hash: String,
    canonical_title: String,
    canonical_body: String,
    body_chars: usize,
}

impl WindowEntry {
    fn from_stored(item: &ContentItem) -> Self {
        Self {
            id: item.id,
            url: item.url.clone(),
            content_hash: item.content_hash.clone(),
            fuzzy_hash: item.fuzzy_hash.clone(),
            canonical_title: canonicalize(&item.title),
            canonical_body: canonicalize(&item.body),
            body_chars: item.body.chars().count(),
        }
    }

    fn from_accepted(item: &ContentItem, fp: Fingerprint) -> Self {
        Self {
            id: item.id,
            url: item.url.clone(),
            content_hash: fp.content_hash,
            fuzzy_hash: fp.fuzzy_hash,
            canonical_title: fp.canonical_title,
            canonical_body: fp.canonical_body,
            body_chars: item.body.chars().count(),
        }
    }
}

/// Owner's non-duplicate items inside the recency window, oldest first.
#[derive(Debug, Default)]
struct Window {
    entries: Vec<Arc<WindowEntry>>,
    by_url: HashMap<String, ItemId>,
    by_hash: HashMap<String, ItemId>,
    /// Highest id seen; ids are handed out in increasing order.
    newest: u64,
}

impl Window {
    /// `items` come from the store, most recent first.
    fn from_items(items: Vec<ContentItem>) -> Self {
        let mut kept: Vec<ContentItem> = items.into_iter().filter(|it| !it.is_duplicate).collect();
        kept.reverse();
        let entries: Vec<WindowEntry> = kept.par_iter().map(WindowEntry::from_stored).collect();
        let mut window = Self::default();
        for entry in entries {
            window.push(entry);
        }
        window
    }

    fn push(&mut self, entry: WindowEntry) {
        if !entry.url.trim().is_empty() {
            self.by_url.entry(entry.url.clone()).or_insert(entry.id);
        }
        self.by_hash
            .entry(entry.content_hash.clone())
            .or_insert(entry.id);
        self.newest = self.newest.max(entry.id.0);
        self.entries.push(Arc::new(entry));
    }

    fn most_recent(&self) -> impl Iterator<Item = &Arc<WindowEntry>> {
        self.entries.iter().rev()
    }
}

/// Items accepted so far in the current batch.
#[derive(Debug, Default)]
struct BatchSeen {
    urls: HashMap<String, ItemId>,
    hashes: HashMap<String, ItemId>,
}

pub struct Deduplicator {
    store: Arc<dyn RecentItemStore>,
    cache: Option<Arc<dyn ResultCache>>,
    ids: Arc<IdSequence>,
    cfg: DedupConfig,
    owner_locks: KeyedLocks<String>,
    body_matcher: BodyMatcher,
}

impl std::fmt::Debug for Deduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("cfg", &self.cfg)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl Deduplicator {
    pub fn new(
        store: Arc<dyn RecentItemStore>,
        cache: Option<Arc<dyn ResultCache>>,
        ids: Arc<IdSequence>,
        cfg: DedupConfig,
    ) -> Self {
        m::ensure_metrics_described();
        Self {
            store,
            cache,
            ids,
            cfg,
            owner_locks: KeyedLocks::default(),
            body_matcher: fingerprint::similar_at_least,
        }
    }

    #[cfg(test)]
    fn with_body_matcher(mut self, matcher: BodyMatcher) -> Self {
        self.body_matcher = matcher;
        self
    }

    pub fn config(&self) -> &DedupConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<dyn RecentItemStore> {
        &self.store
    }

    pub async fn deduplicate(
        &self,
        batch: Vec<FetchedItem>,
        owner: &str,
        cancel: &CancellationToken,
    ) -> DedupReport {
        self.deduplicate_at(batch, owner, Utc::now(), cancel).await
    }

    /// Deduplicate `batch` for `owner` as of `now`. Batches of the same owner are
    /// serialized; batches of different owners run independently.
    pub async fn deduplicate_at(
        &self,
        batch: Vec<FetchedItem>,
        owner: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> DedupReport {
        let started = Instant::now();
        let _serial = self.owner_locks.lock(&owner.to_string()).await;

        let mut report = DedupReport {
            assigned: vec![None; batch.len()],
            ..DedupReport::default()
        };

        let (batch, foreign): (Vec<(usize, FetchedItem)>, Vec<(usize, FetchedItem)>) = batch
            .into_iter()
            .enumerate()
            .partition(|(_, f)| f.owner_id == owner);
        if !foreign.is_empty() {
            warn!(target: "dedup", owner, skipped = foreign.len(), "items for another owner left out of batch");
            report.skipped_foreign = foreign.len();
        }
        counter!(m::DEDUP_ITEMS_TOTAL).increment(batch.len() as u64);

        let mut window = match self.load_window(owner, now - self.cfg.window()).await {
            Ok(w) => w,
            Err(e) => {
                warn!(target: "dedup", owner, error = %e, "recent window unavailable; in-batch checks only");
                report.window_degraded = true;
                Window::default()
            }
        };

        let prints: Vec<Fingerprint> = batch
            .par_iter()
            .map(|(_, f)| Fingerprint::of(&f.title, &f.body))
            .collect();

        let mut seen = BatchSeen::default();
        for ((pos, fetched), fp) in batch.into_iter().zip(prints) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                info!(target: "dedup", owner, decided = report.processed(), "batch cancelled");
                break;
            }
            let id = self
                .process_one(fetched, fp, owner, now, &mut window, &mut seen, &mut report)
                .await;
            report.assigned[pos] = Some(id);
        }

        histogram!(m::DEDUP_BATCH_DURATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            target: "dedup",
            owner,
            unique = report.unique.len(),
            duplicates = report.duplicates.len(),
            fail_open = report.fail_open,
            degraded = report.window_degraded,
            "batch deduplicated"
        );
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_one(
        &self,
        fetched: FetchedItem,
        fp: Fingerprint,
        owner: &str,
        now: DateTime<Utc>,
        window: &mut Window,
        seen: &mut BatchSeen,
        report: &mut DedupReport,
    ) -> ItemId {
        let id = self.ids.next_id();
        let mut item = ContentItem::from_fetched(
            id,
            fetched,
            now,
            fp.content_hash.clone(),
            fp.fuzzy_hash.clone(),
        );

        let decision = match self.decide(owner, &item, &fp, window, seen).await {
            Ok(d) => d,
            Err(e) => {
                warn!(target: "dedup", owner, item_id = %id, hash = short_id(&item.content_hash), error = %e, "check failed; keeping item");
                report.fail_open += 1;
                counter!(m::DEDUP_FAIL_OPEN_TOTAL).increment(1);
                DedupDecision::Unique
            }
        };

        if let DedupDecision::Duplicate { original, stage } = decision {
            self.record_duplicate(item, original, stage, owner, report).await;
            return id;
        }

        match self.insert_with_retry(&item).await {
            Ok(()) => {}
            Err(StoreError::Conflict { existing }) => {
                // lost the race against a concurrent writer
                self.record_duplicate(item, existing, DuplicateStage::ContentHash, owner, report)
                    .await;
                return id;
            }
            Err(e) => {
                warn!(target: "dedup", owner, item_id = %id, error = %e, "insert failed after retry; keeping item");
                report.fail_open += 1;
                counter!(m::DEDUP_FAIL_OPEN_TOTAL).increment(1);
            }
        }

        if !item.url.trim().is_empty() {
            seen.urls.entry(item.url.clone()).or_insert(id);
        }
        seen.hashes.entry(item.content_hash.clone()).or_insert(id);
        window.push(WindowEntry::from_accepted(&item, fp));
        debug!(target: "dedup", owner, item_id = %id, hash = short_id(&item.content_hash), "unique");
        report.unique.push(item);
        id
    }

    async fn record_duplicate(
        &self,
        mut item: ContentItem,
        original: ItemId,
        stage: DuplicateStage,
        owner: &str,
        report: &mut DedupReport,
    ) {
        item.mark_duplicate_of(original);
        if let Err(e) = self.insert_with_retry(&item).await {
            warn!(target: "dedup", owner, item_id = %item.id, error = %e, "duplicate record not persisted");
        }
        counter!(m::DEDUP_DUPLICATES_TOTAL, "stage" => stage.as_str()).increment(1);
        info!(
            target: "dedup",
            owner,
            item_id = %item.id,
            original = %original,
            stage = stage.as_str(),
            hash = short_id(&item.content_hash),
            "duplicate detected"
        );
        report.duplicates.push(DuplicateItem { item, stage });
    }

    async fn decide(
        &self,
        owner: &str,
        item: &ContentItem,
        fp: &Fingerprint,
        window: &Window,
        seen: &BatchSeen,
    ) -> Result<DedupDecision, DedupError> {
        let dup = |original, stage| DedupDecision::Duplicate { original, stage };
        let has_url = !item.url.trim().is_empty();

        if has_url {
            if let Some(&original) = seen.urls.get(&item.url) {
                return Ok(dup(original, DuplicateStage::BatchUrl));
            }
        }
        if let Some(&original) = seen.hashes.get(&fp.content_hash) {
            return Ok(dup(original, DuplicateStage::BatchHash));
        }
        if has_url {
            if let Some(&original) = window.by_url.get(&item.url) {
                return Ok(dup(original, DuplicateStage::UrlExact));
            }
        }
        if let Some(&original) = window.by_hash.get(&fp.content_hash) {
            return Ok(dup(original, DuplicateStage::ContentHash));
        }
        if let Some(original) = self.title_match(item, fp, window) {
            return Ok(dup(original, DuplicateStage::TitleSimilar));
        }

        if item.body.chars().count() < self.cfg.min_body_chars {
            return Ok(DedupDecision::Unique);
        }
        let cache_key = format!("dedup:{owner}:{}", fp.content_hash);
        let checked_through = self.cached_unique(&cache_key).await;
        if let Some(through) = checked_through {
            counter!(m::DEDUP_CACHE_HITS_TOTAL).increment(1);
            debug!(target: "dedup", owner, hash = short_id(&fp.content_hash), through, "cached verdict; body stage limited to newer items");
        }
        if let Some(original) = self
            .content_match(fp, window, checked_through.unwrap_or(0))
            .await?
        {
            return Ok(dup(original, DuplicateStage::ContentSimilar));
        }
        self.remember_unique(&cache_key, window.newest).await;
        Ok(DedupDecision::Unique)
    }

    fn title_match(&self, item: &ContentItem, fp: &Fingerprint, window: &Window) -> Option<ItemId> {
        if item.title.trim().chars().count() < self.cfg.min_title_chars {
            return None;
        }
        window
            .most_recent()
            .filter(|e| !e.canonical_title.is_empty())
            .take(self.cfg.title_candidates)
            .find(|e| {
                fingerprint::similar_at_least(
                    &fp.canonical_title,
                    &e.canonical_title,
                    self.cfg.title_threshold,
                )
            })
            .map(|e| e.id)
    }

    /// Body similarity against window items with an id above `newer_than`.
    async fn content_match(
        &self,
        fp: &Fingerprint,
        window: &Window,
        newer_than: u64,
    ) -> Result<Option<ItemId>, DedupError> {
        let candidates: Vec<Arc<WindowEntry>> = window
            .most_recent()
            .filter(|e| e.body_chars >= self.cfg.min_body_chars)
            .take(self.cfg.body_candidates)
            .filter(|e| e.id.0 > newer_than)
            .filter(|e| fingerprint::fuzzy_similar(&fp.fuzzy_hash, &e.fuzzy_hash, self.cfg.fuzzy_threshold))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let body = fp.canonical_body.clone();
        let threshold = self.cfg.content_threshold;
        let matches = self.body_matcher;
        tokio::task::spawn_blocking(move || {
            candidates
                .iter()
                .find(|e| matches(&body, &e.canonical_body, threshold))
                .map(|e| e.id)
        })
        .await
        .map_err(|e| DedupError::Computation(e.to_string()))
    }

    /// Newest window id a cached unique verdict covers.
    async fn cached_unique(&self, key: &str) -> Option<u64> {
        let value = self.cache.as_ref()?.get(key).await?;
        value
            .strip_prefix(UNIQUE_VERDICT)?
            .strip_prefix(':')?
            .parse()
            .ok()
    }

    async fn remember_unique(&self, key: &str, through: u64) {
        if let Some(cache) = &self.cache {
            cache
                .set(
                    key,
                    format!("{UNIQUE_VERDICT}:{through}"),
                    StdDuration::from_secs(self.cfg.verdict_ttl_secs),
                )
                .await;
        }
    }

    async fn load_window(&self, owner: &str, since: DateTime<Utc>) -> Result<Window, StoreError> {
        let items = match self.store.query(owner, since).await {
            Err(StoreError::Unavailable(e)) => {
                debug!(target: "dedup", owner, error = %e, "window query failed; retrying once");
                tokio::time::sleep(self.cfg.retry_backoff()).await;
                self.store.query(owner, since).await?
            }
            other => other?,
        };
        Ok(Window::from_items(items))
    }

    async fn insert_with_retry(&self, item: &ContentItem) -> Result<(), StoreError> {
        match self.store.insert(item).await {
            Err(StoreError::Unavailable(e)) => {
                debug!(target: "dedup", item_id = %item.id, error = %e, "insert failed; retrying once");
                tokio::time::sleep(self.cfg.retry_backoff()).await;
                self.store.insert(item).await
            }
            other => other,
        }
    }
}
