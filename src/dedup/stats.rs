use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::ingest::store::RecentItemStore;

/// Aggregate view of one owner's stored items over a lookback period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupStats {
    pub total_items: usize,
    /// Items whose content hash is shared with at least one other item.
    pub duplicate_by_hash: usize,
    /// Items whose URL is shared with at least one other item.
    pub duplicate_by_url: usize,
    pub unique_items: usize,
    /// Percentage in `[0, 100]`.
    pub dedup_rate: f64,
    pub period_days: u32,
}

impl DedupStats {
    fn empty(period_days: u32) -> Self {
        Self {
            total_items: 0,
            duplicate_by_hash: 0,
            duplicate_by_url: 0,
            unique_items: 0,
            dedup_rate: 0.0,
            period_days,
        }
    }
}

pub async fn dedup_stats(
    store: &dyn RecentItemStore,
    owner: &str,
    period_days: u32,
    now: DateTime<Utc>,
) -> Result<DedupStats, StoreError> {
    let since = now - Duration::days(i64::from(period_days));
    let items = store.query(owner, since).await?;
    if items.is_empty() {
        return Ok(DedupStats::empty(period_days));
    }

    let mut hashes: HashMap<&str, usize> = HashMap::new();
    let mut urls: HashMap<&str, usize> = HashMap::new();
    for it in &items {
        if !it.content_hash.is_empty() {
            *hashes.entry(it.content_hash.as_str()).or_default() += 1;
        }
        if !it.url.trim().is_empty() {
            *urls.entry(it.url.as_str()).or_default() += 1;
        }
    }
    let shared = |groups: &HashMap<&str, usize>| groups.values().filter(|&&n| n > 1).sum::<usize>();
    let duplicate_by_hash = shared(&hashes);
    let duplicate_by_url = shared(&urls);

    let total_items = items.len();
    let worst = duplicate_by_hash.max(duplicate_by_url);
    Ok(DedupStats {
        total_items,
        duplicate_by_hash,
        duplicate_by_url,
        unique_items: total_items - worst,
        dedup_rate: worst as f64 / total_items as f64 * 100.0,
        period_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::store::InMemoryItemStore;
    use crate::ingest::types::{ContentItem, ContentType, ItemId};
    use chrono::TimeZone;

    fn stored(id: u64, url: &str, hash: &str, dup_of: Option<u64>, at: DateTime<Utc>) -> ContentItem {
        ContentItem {
            id: ItemId(id),
            owner_id: "u".into(),
            source_id: "s".into(),
            title: String::new(),
            body: String::new(),
            url: url.into(),
            published_at: at,
            ingested_at: at,
            content_hash: hash.into(),
            fuzzy_hash: String::new(),
            topics: vec![],
            author: None,
            content_type: ContentType::Blog,
            importance_score: 0.5,
            engagement_score: 0.0,
            is_duplicate: dup_of.is_some(),
            duplicate_of: dup_of.map(ItemId),
        }
    }

    #[tokio::test]
    async fn counts_shared_hashes_and_urls() {
        let store = InMemoryItemStore::new();
        let t = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        store.insert(&stored(1, "http://a", "h1", None, t)).await.unwrap();
        store.insert(&stored(2, "http://a", "h2", Some(1), t)).await.unwrap();
        store.insert(&stored(3, "http://b", "h1", Some(1), t)).await.unwrap();
        store.insert(&stored(4, "http://c", "h4", None, t)).await.unwrap();

        let s = dedup_stats(&store, "u", 30, t).await.unwrap();
        assert_eq!(s.total_items, 4);
        assert_eq!(s.duplicate_by_hash, 2);
        assert_eq!(s.duplicate_by_url, 2);
        assert_eq!(s.unique_items, 2);
        assert!((s.dedup_rate - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_owner_has_zero_rate() {
        let store = InMemoryItemStore::new();
        let t = Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap();
        let s = dedup_stats(&store, "nobody", 7, t).await.unwrap();
        assert_eq!(s, DedupStats::empty(7));
    }
}
