use metrics::{describe_counter, describe_histogram, Unit};
use once_cell::sync::OnceCell;

pub const DEDUP_ITEMS_TOTAL: &str = "dedup_items_total";
pub const DEDUP_DUPLICATES_TOTAL: &str = "dedup_duplicates_total";
pub const DEDUP_FAIL_OPEN_TOTAL: &str = "dedup_fail_open_total";
pub const DEDUP_CACHE_HITS_TOTAL: &str = "dedup_cache_hits_total";
pub const DEDUP_BATCH_DURATION_MS: &str = "dedup_batch_duration_ms";
pub const DIGEST_ITEMS_SELECTED: &str = "digest_items_selected";
pub const DIGEST_FALLBACK_TOTAL: &str = "digest_fallback_total";
pub const PREFERENCE_UPDATES_TOTAL: &str = "preference_updates_total";
pub const PREFERENCE_CONFLICTS_TOTAL: &str = "preference_conflicts_total";

/// Register names/descriptions once per process. Safe to call from every
/// constructor; only the first call does anything.
pub fn ensure_metrics_described() {
    static DESCRIBED: OnceCell<()> = OnceCell::new();
    DESCRIBED.get_or_init(|| {
        describe_counter!(DEDUP_ITEMS_TOTAL, "Fetched items run through deduplication.");
        describe_counter!(
            DEDUP_DUPLICATES_TOTAL,
            "Items flagged duplicate, labelled by matching stage."
        );
        describe_counter!(
            DEDUP_FAIL_OPEN_TOTAL,
            "Items accepted as unique after a store or computation failure."
        );
        describe_counter!(
            DEDUP_CACHE_HITS_TOTAL,
            "No-duplicate verdicts served from the result cache."
        );
        describe_histogram!(
            DEDUP_BATCH_DURATION_MS,
            Unit::Milliseconds,
            "Wall time of one deduplication batch."
        );
        describe_histogram!(DIGEST_ITEMS_SELECTED, "Items placed into one digest.");
        describe_counter!(
            DIGEST_FALLBACK_TOTAL,
            "Digests built from recency order because ranking failed."
        );
        describe_counter!(PREFERENCE_UPDATES_TOTAL, "Applied preference interactions.");
        describe_counter!(
            PREFERENCE_CONFLICTS_TOTAL,
            "Compare-and-set retries on preference entries."
        );
    });
}
