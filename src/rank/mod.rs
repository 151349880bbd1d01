//! # Relevance ranking
//!
//! Scores surviving items against a user's preference snapshot. Pure with
//! respect to its inputs: items are read, never mutated.

pub mod scoring;
pub mod weights;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::RankError;
use crate::ingest::types::{ContentItem, ContentType};
use crate::preferences::{PreferenceProfile, PreferenceType};

pub use scoring::ScoreFactors;
pub use weights::{HotReloadWeights, RankingWeights};

pub const DEFAULT_READING_WPM: u32 = 200;
/// Only the first few preferred content types earn a type score.
pub const RANKED_TYPE_SLOTS: usize = 3;

/// Per-user settings that are not learned from feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    /// Most preferred first.
    #[serde(default)]
    pub preferred_content_types: Vec<ContentType>,
    #[serde(default = "default_wpm")]
    pub reading_speed_wpm: u32,
}

fn default_wpm() -> u32 {
    DEFAULT_READING_WPM
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            preferred_content_types: Vec::new(),
            reading_speed_wpm: DEFAULT_READING_WPM,
        }
    }

    pub fn with_content_types(mut self, types: impl IntoIterator<Item = ContentType>) -> Self {
        self.preferred_content_types = types.into_iter().collect();
        self
    }

    /// `(3 - rank) / 3` for the top three preferred types, 0 otherwise.
    pub fn type_score(&self, ct: ContentType) -> f32 {
        match self.preferred_content_types.iter().position(|&t| t == ct) {
            Some(rank) if rank < RANKED_TYPE_SLOTS => {
                (RANKED_TYPE_SLOTS - rank) as f32 / RANKED_TYPE_SLOTS as f32
            }
            _ => 0.0,
        }
    }

    pub fn reading_wpm(&self) -> u32 {
        self.reading_speed_wpm.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub item: ContentItem,
    pub score: f32,
    pub factors: ScoreFactors,
}

#[derive(Debug)]
enum WeightSource {
    Fixed(RankingWeights),
    HotReload(Arc<HotReloadWeights>),
}

#[derive(Debug)]
pub struct RankingEngine {
    weights: WeightSource,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(RankingWeights::default())
    }
}

impl RankingEngine {
    pub fn new(weights: RankingWeights) -> Self {
        Self {
            weights: WeightSource::Fixed(weights.sanitized()),
        }
    }

    pub fn with_hot_reload(weights: Arc<HotReloadWeights>) -> Self {
        Self {
            weights: WeightSource::HotReload(weights),
        }
    }

    pub fn weights(&self) -> RankingWeights {
        match &self.weights {
            WeightSource::Fixed(w) => *w,
            WeightSource::HotReload(h) => h.current(),
        }
    }

    pub fn factors_at(
        &self,
        item: &ContentItem,
        prefs: &PreferenceProfile,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> ScoreFactors {
        let topic = if item.topics.is_empty() {
            0.0
        } else {
            item.topics
                .iter()
                .map(|t| prefs.score(PreferenceType::Topic, &t.name) * t.confidence)
                .sum::<f32>()
                / item.topics.len() as f32
        };
        let author = item
            .author
            .as_deref()
            .map_or(0.0, |a| prefs.score(PreferenceType::Author, a));
        let hours_old = (now - item.published_at).num_seconds() as f32 / 3600.0;

        ScoreFactors {
            topic,
            source: prefs.score(PreferenceType::Source, &item.source_id),
            author,
            content_type: profile.type_score(item.content_type),
            importance: item.importance_score,
            time: scoring::time_factor(hours_old),
            engagement: scoring::engagement_factor(item.engagement_score),
        }
    }

    pub fn score_at(
        &self,
        item: &ContentItem,
        prefs: &PreferenceProfile,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<ScoredItem, RankError> {
        self.score_with(&self.weights(), item, prefs, profile, now)
    }

    fn score_with(
        &self,
        w: &RankingWeights,
        item: &ContentItem,
        prefs: &PreferenceProfile,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<ScoredItem, RankError> {
        let factors = self.factors_at(item, prefs, profile, now);
        if let Some(factor) = factors.non_finite() {
            return Err(RankError::NonFinite {
                item: item.id,
                factor,
            });
        }
        Ok(ScoredItem {
            item: item.clone(),
            score: scoring::final_score(&factors, w),
            factors,
        })
    }

    /// Score all items with one weight snapshot, best first. Ties go to the
    /// newer item, then the higher id.
    pub fn rank_at(
        &self,
        items: &[ContentItem],
        prefs: &PreferenceProfile,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScoredItem>, RankError> {
        let w = self.weights();
        let mut scored = items
            .par_iter()
            .map(|it| self.score_with(&w, it, prefs, profile, now))
            .collect::<Result<Vec<_>, _>>()?;
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.item.published_at.cmp(&a.item.published_at))
                .then(b.item.id.cmp(&a.item.id))
        });
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{ItemId, Topic};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 12, 0, 0).unwrap()
    }

    fn item(id: u64, hours_old: i64) -> ContentItem {
        ContentItem {
            id: ItemId(id),
            owner_id: "u".into(),
            source_id: "wire".into(),
            title: "t".into(),
            body: "b".into(),
            url: format!("http://x/{id}"),
            published_at: now() - Duration::hours(hours_old),
            ingested_at: now(),
            content_hash: format!("h{id}"),
            fuzzy_hash: String::new(),
            topics: vec![Topic::new("rust", 1.0)],
            author: Some("ann".into()),
            content_type: ContentType::Blog,
            importance_score: 0.5,
            engagement_score: 0.0,
            is_duplicate: false,
            duplicate_of: None,
        }
    }

    #[test]
    fn type_score_by_rank() {
        let p = UserProfile::new("u").with_content_types([
            ContentType::Blog,
            ContentType::News,
            ContentType::Video,
            ContentType::Podcast,
        ]);
        assert_eq!(p.type_score(ContentType::Blog), 1.0);
        assert!((p.type_score(ContentType::News) - 2.0 / 3.0).abs() < 1e-6);
        assert!((p.type_score(ContentType::Video) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(p.type_score(ContentType::Podcast), 0.0);
        assert_eq!(p.type_score(ContentType::Academic), 0.0);
    }

    #[test]
    fn factors_follow_preferences() {
        let mut prefs = PreferenceProfile::new("u");
        prefs.set(PreferenceType::Topic, "rust", 0.8);
        prefs.set(PreferenceType::Source, "wire", -0.5);
        prefs.set(PreferenceType::Author, "ann", 0.4);
        let profile = UserProfile::new("u").with_content_types([ContentType::Blog]);
        let f = RankingEngine::default().factors_at(&item(1, 0), &prefs, &profile, now());
        assert!((f.topic - 0.8).abs() < 1e-6);
        assert_eq!(f.source, -0.5);
        assert_eq!(f.author, 0.4);
        assert_eq!(f.content_type, 1.0);
        assert_eq!(f.time, 1.0);
    }

    #[test]
    fn newer_items_rank_first_when_otherwise_equal() {
        let engine = RankingEngine::default();
        let prefs = PreferenceProfile::new("u");
        let profile = UserProfile::new("u");
        let ranked = engine
            .rank_at(&[item(1, 100), item(2, 2), item(3, 50)], &prefs, &profile, now())
            .unwrap();
        let ids: Vec<u64> = ranked.iter().map(|s| s.item.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(ranked.iter().all(|s| (0.0..=1.0).contains(&s.score)));
    }

    #[test]
    fn non_finite_factor_is_an_error() {
        let mut bad = item(9, 1);
        bad.importance_score = f32::NAN;
        let err = RankingEngine::default()
            .score_at(&bad, &PreferenceProfile::new("u"), &UserProfile::new("u"), now())
            .unwrap_err();
        assert!(matches!(err, RankError::NonFinite { factor: "importance", .. }));
    }
}
