//! # Digest selection
//!
//! Greedy value-density knapsack under two budgets at once: item count
//! (cognitive budget) and total estimated reading time. A diversity gate keeps a
//! single source with overlapping topics from taking over the digest once it is
//! half full.

use std::collections::{BTreeMap, HashSet};

use metrics::histogram;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ingest::types::ContentItem;
use crate::metrics as m;
use crate::rank::{ScoredItem, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Maximum number of items in one digest.
    pub cognitive_budget: usize,
    /// Maximum summed reading cost, in seconds.
    pub time_budget_secs: f32,
    /// Shared topics at which an already-used source is considered redundant.
    pub topic_overlap_limit: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            cognitive_budget: 7,
            time_budget_secs: 180.0,
            topic_overlap_limit: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestEntry {
    pub item: ContentItem,
    pub score: f32,
    pub reading_secs: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DigestSelection {
    pub items: Vec<DigestEntry>,
    pub total_reading_secs: f32,
    pub source_counts: BTreeMap<String, usize>,
    pub topic_counts: BTreeMap<String, usize>,
    /// Built from recency order because ranking failed.
    pub fallback: bool,
}

impl DigestSelection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(&mut self, entry: DigestEntry) {
        self.total_reading_secs += entry.reading_secs;
        *self
            .source_counts
            .entry(entry.item.source_id.clone())
            .or_default() += 1;
        for name in distinct_topics(&entry.item) {
            *self.topic_counts.entry(name.to_string()).or_default() += 1;
        }
        self.items.push(entry);
    }
}

/// Estimated seconds to read `item` at `wpm` words per minute. Empty bodies
/// still cost one word.
pub fn reading_cost_secs(item: &ContentItem, wpm: u32) -> f32 {
    let words = item.word_count().max(1) as f32;
    words / wpm.max(1) as f32 * 60.0
}

fn distinct_topics(item: &ContentItem) -> impl Iterator<Item = &str> {
    let mut seen = HashSet::new();
    item.topic_names().filter(move |n| seen.insert(*n))
}

#[derive(Debug, Clone, Default)]
pub struct DigestSelector {
    cfg: DigestConfig,
}

struct Candidate {
    item: ContentItem,
    score: f32,
    reading_secs: f32,
}

impl DigestSelector {
    pub fn new(cfg: DigestConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DigestConfig {
        &self.cfg
    }

    /// Select from ranked items by score per second of reading, best first.
    pub fn select(&self, ranked: Vec<ScoredItem>, profile: &UserProfile) -> DigestSelection {
        let wpm = profile.reading_wpm();
        let mut candidates: Vec<Candidate> = ranked
            .into_iter()
            .map(|s| Candidate {
                reading_secs: reading_cost_secs(&s.item, wpm),
                score: s.score,
                item: s.item,
            })
            .collect();
        candidates.sort_by(|a, b| {
            let da = a.score / a.reading_secs;
            let db = b.score / b.reading_secs;
            db.total_cmp(&da)
                .then(b.score.total_cmp(&a.score))
                .then(b.item.published_at.cmp(&a.item.published_at))
                .then(b.item.id.cmp(&a.item.id))
        });
        let selection = self.fill(candidates, true);
        debug!(
            target: "digest",
            user = %profile.user_id,
            selected = selection.len(),
            secs = selection.total_reading_secs,
            "digest selected"
        );
        histogram!(m::DIGEST_ITEMS_SELECTED).record(selection.len() as f64);
        selection
    }

    /// Newest first under the same budgets; used when ranking is unavailable.
    pub fn select_by_recency(&self, items: Vec<ContentItem>, profile: &UserProfile) -> DigestSelection {
        let wpm = profile.reading_wpm();
        let mut candidates: Vec<Candidate> = items
            .into_iter()
            .map(|item| Candidate {
                reading_secs: reading_cost_secs(&item, wpm),
                score: 0.0,
                item,
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.item
                .published_at
                .cmp(&a.item.published_at)
                .then(b.item.id.cmp(&a.item.id))
        });
        let mut selection = self.fill(candidates, false);
        selection.fallback = true;
        histogram!(m::DIGEST_ITEMS_SELECTED).record(selection.len() as f64);
        selection
    }

    fn fill(&self, candidates: Vec<Candidate>, diversity: bool) -> DigestSelection {
        let budget = self.cfg.cognitive_budget;
        let mut out = DigestSelection::default();
        let mut used_topics: HashSet<String> = HashSet::new();

        for c in candidates {
            if out.len() >= budget {
                break;
            }
            if out.total_reading_secs + c.reading_secs > self.cfg.time_budget_secs {
                continue;
            }
            if diversity && out.len() * 2 >= budget && self.redundant(&c.item, &out, &used_topics) {
                debug!(target: "digest", item_id = %c.item.id, source = %c.item.source_id, "skipped by diversity gate");
                continue;
            }
            used_topics.extend(distinct_topics(&c.item).map(str::to_string));
            out.push(DigestEntry {
                item: c.item,
                score: c.score,
                reading_secs: c.reading_secs,
            });
        }
        out
    }

    fn redundant(&self, item: &ContentItem, out: &DigestSelection, used_topics: &HashSet<String>) -> bool {
        if !out.source_counts.contains_key(&item.source_id) {
            return false;
        }
        let shared = distinct_topics(item)
            .filter(|t| used_topics.contains(*t))
            .count();
        shared >= self.cfg.topic_overlap_limit
    }
}
