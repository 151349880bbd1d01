//! Wiring of the curation stages behind the three operations collaborators
//! call: deduplicate a fetched batch, rank and select a digest, record feedback.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{InMemoryCache, ResultCache};
use crate::config::PipelineConfig;
use crate::dedup::{self, DedupReport, DedupStats, Deduplicator};
use crate::digest::{DigestSelection, DigestSelector};
use crate::error::{FeedbackError, StoreError};
use crate::ingest::store::{InMemoryItemStore, RecentItemStore};
use crate::ingest::types::{ContentItem, FetchedItem, IdSequence, ItemId};
use crate::metrics as m;
use crate::preferences::feedback::interactions_for;
use crate::preferences::{FeedbackAction, PreferenceStore};
use crate::rank::{RankingEngine, UserProfile};

pub struct DigestPipeline {
    store: Arc<dyn RecentItemStore>,
    dedup: Deduplicator,
    preferences: Arc<PreferenceStore>,
    ranking: RankingEngine,
    selector: DigestSelector,
}

impl std::fmt::Debug for DigestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestPipeline")
            .field("dedup", &self.dedup)
            .field("ranking", &self.ranking)
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

impl DigestPipeline {
    pub fn new(
        cfg: &PipelineConfig,
        store: Arc<dyn RecentItemStore>,
        cache: Option<Arc<dyn ResultCache>>,
        preferences: Arc<PreferenceStore>,
        ids: Arc<IdSequence>,
    ) -> Self {
        m::ensure_metrics_described();
        Self {
            dedup: Deduplicator::new(store.clone(), cache, ids, cfg.dedup.clone()),
            store,
            preferences,
            ranking: RankingEngine::new(cfg.ranking),
            selector: DigestSelector::new(cfg.digest),
        }
    }

    /// All collaborators in memory: item store, verdict cache, preferences.
    pub fn in_memory(cfg: &PipelineConfig) -> Self {
        Self::new(
            cfg,
            Arc::new(InMemoryItemStore::new()),
            Some(Arc::new(InMemoryCache::default())),
            Arc::new(PreferenceStore::default()),
            Arc::new(IdSequence::default()),
        )
    }

    /// Replace the ranking engine, e.g. with one backed by hot-reloaded weights.
    pub fn with_ranking_engine(mut self, ranking: RankingEngine) -> Self {
        self.ranking = ranking;
        self
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
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
        self.dedup.deduplicate(batch, owner, cancel).await
    }

    pub async fn deduplicate_at(
        &self,
        batch: Vec<FetchedItem>,
        owner: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> DedupReport {
        self.dedup.deduplicate_at(batch, owner, now, cancel).await
    }

    pub async fn rank_and_select(&self, items: &[ContentItem], profile: &UserProfile) -> DigestSelection {
        self.rank_and_select_at(items, profile, Utc::now()).await
    }

    /// Rank `items` for `profile` and select the digest. Never fails: when the
    /// preference snapshot or a score cannot be computed, the digest is built
    /// from recency order instead. Duplicates are never selected.
    pub async fn rank_and_select_at(
        &self,
        items: &[ContentItem],
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> DigestSelection {
        let candidates: Vec<ContentItem> = items.iter().filter(|it| !it.is_duplicate).cloned().collect();

        let ranked = match self.preferences.profile(&profile.user_id).await {
            Ok(prefs) => self
                .ranking
                .rank_at(&candidates, &prefs, profile, now)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match ranked {
            Ok(ranked) => self.selector.select(ranked, profile),
            Err(reason) => {
                warn!(target: "digest", user = %profile.user_id, %reason, "ranking failed; using recency order");
                counter!(m::DIGEST_FALLBACK_TOTAL).increment(1);
                self.selector.select_by_recency(candidates, profile)
            }
        }
    }

    /// Apply a user action on one of `owner`'s items to their preferences.
    /// Returns the number of preference entries updated. Every key is attempted
    /// even if an earlier one fails; the first failure is returned.
    pub async fn record_feedback(
        &self,
        owner: &str,
        item_id: ItemId,
        action: FeedbackAction,
    ) -> Result<usize, FeedbackError> {
        let item = self
            .store
            .get(owner, item_id)
            .await?
            .ok_or(FeedbackError::UnknownItem(item_id))?;

        let Some(is_positive) = action.polarity() else {
            debug!(target: "preferences", owner, item_id = %item_id, ?action, "neutral action; no update");
            return Ok(0);
        };

        let mut updated = 0;
        let mut first_err = None;
        for i in interactions_for(&item) {
            match self
                .preferences
                .record_interaction(owner, i.kind, &i.key, is_positive, i.weight)
                .await
            {
                Ok(_) => updated += 1,
                Err(e) => {
                    warn!(target: "preferences", owner, item_id = %item_id, error = %e, "feedback update failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(updated),
        }
    }

    pub async fn dedup_stats(&self, owner: &str, period_days: u32) -> Result<DedupStats, StoreError> {
        dedup::dedup_stats(self.store.as_ref(), owner, period_days, Utc::now()).await
    }
}
