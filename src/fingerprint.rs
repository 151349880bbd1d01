//! # Fingerprints
//!
//! Exact and approximate identity of canonicalized text:
//!
//! - `content_hash`: SHA-256 hex of the canonical text. Equal hashes are treated
//!   as true duplicates.
//! - `fuzzy_hash`: 16 hex chars of an xxh3 over the top-20 keywords. Cheap
//!   pre-filter, compared position-wise with `fuzzy_similar`.
//! - `similarity`: LCS ratio `2·|LCS| / (|a| + |b|)` over characters. Symmetric,
//!   reflexive, always in `[0, 1]`.

use std::collections::HashMap;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;

use crate::ingest::canonicalize;

/// Keywords folded into the fuzzy hash.
pub const FUZZY_KEYWORDS: usize = 20;
/// Hex length of a fuzzy hash.
pub const FUZZY_HASH_LEN: usize = 16;
/// Default admission threshold for `fuzzy_similar`.
pub const DEFAULT_FUZZY_THRESHOLD: f32 = 0.6;
/// Longest piece fed into one quadratic LCS pass.
pub const MAX_SIMILARITY_CHARS: usize = 4000;

/// Hashes of one item, computed together from its canonical text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub canonical_title: String,
    pub canonical_body: String,
    pub content_hash: String,
    pub fuzzy_hash: String,
}

impl Fingerprint {
    /// Fingerprint a raw title/body pair. The body is the hashed text; a blank
    /// body falls back to the title so empty bodies do not all collide.
    pub fn of(title: &str, body: &str) -> Self {
        let canonical_title = canonicalize(title);
        let canonical_body = canonicalize(body);
        let hashed = if canonical_body.is_empty() {
            canonical_title.as_str()
        } else {
            canonical_body.as_str()
        };
        let content_hash = content_hash_canonical(hashed);
        let fuzzy_hash = fuzzy_hash_canonical(hashed);
        Self {
            canonical_title,
            canonical_body,
            content_hash,
            fuzzy_hash,
        }
    }
}

/// SHA-256 (lowercase hex) of the canonicalized text.
pub fn content_hash(text: &str) -> String {
    content_hash_canonical(&canonicalize(text))
}

pub(crate) fn content_hash_canonical(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Keyword-shingle fingerprint of the canonicalized text.
pub fn fuzzy_hash(text: &str) -> String {
    fuzzy_hash_canonical(&canonicalize(text))
}

pub(crate) fn fuzzy_hash_canonical(canonical: &str) -> String {
    let features: String = top_keywords(canonical, FUZZY_KEYWORDS).concat();
    format!("{:016x}", xxh3_64(features.as_bytes()))
}

/// Words longer than two characters, by frequency descending; ties keep
/// first-occurrence order.
pub(crate) fn top_keywords(canonical: &str, n: usize) -> Vec<&str> {
    // word -> (count, first position)
    let mut freq: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, w) in canonical
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .enumerate()
    {
        freq.entry(w).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> =
        freq.into_iter().map(|(w, (c, p))| (w, c, p)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(n).map(|(w, _, _)| w).collect()
}

/// `1 - hamming(h1, h2) / len(h1)`, over hex digits. Hashes of different
/// length (or empty) never compare similar.
pub fn fuzzy_ratio(h1: &str, h2: &str) -> f32 {
    if h1.is_empty() || h1.len() != h2.len() {
        return 0.0;
    }
    let distance = h1
        .bytes()
        .zip(h2.bytes())
        .filter(|(a, b)| a != b)
        .count();
    1.0 - distance as f32 / h1.len() as f32
}

pub fn fuzzy_similar(h1: &str, h2: &str, threshold: f32) -> bool {
    fuzzy_ratio(h1, h2) >= threshold
}

/// Sequence-matching ratio of two raw texts (canonicalized first).
pub fn similarity(a: &str, b: &str) -> f32 {
    canonical_similarity(&canonicalize(a), &canonicalize(b))
}

/// LCS ratio of two already-canonical strings.
///
/// Both strings are split into the same number of proportional pieces, none
/// longer than `MAX_SIMILARITY_CHARS`, and the per-piece LCS lengths are summed.
/// The sum is a common subsequence of the full strings, so the ratio over the
/// full lengths never exceeds the exact one.
pub(crate) fn canonical_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let lcs = piecewise_lcs_len(&a, &b);
    (2 * lcs) as f32 / total as f32
}

/// `canonical_similarity(a, b) >= threshold`, skipping the DP when even a full
/// overlap of the shorter string could not reach the threshold.
pub(crate) fn similar_at_least(a: &str, b: &str, threshold: f32) -> bool {
    let la = a.chars().count();
    let lb = b.chars().count();
    if la + lb > 0 {
        let upper = (2 * la.min(lb)) as f32 / (la + lb) as f32;
        if upper < threshold {
            return false;
        }
    }
    canonical_similarity(a, b) >= threshold
}

fn piecewise_lcs_len(a: &[char], b: &[char]) -> usize {
    let pieces = a.len().max(b.len()).div_ceil(MAX_SIMILARITY_CHARS).max(1);
    (0..pieces)
        .map(|i| lcs_len(piece(a, i, pieces), piece(b, i, pieces)))
        .sum()
}

fn piece(s: &[char], i: usize, pieces: usize) -> &[char] {
    &s[s.len() * i / pieces..s.len() * (i + 1) / pieces]
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    // keep the shorter sequence on the inner axis
    let (outer, inner) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; inner.len() + 1];
    let mut curr = vec![0usize; inner.len() + 1];
    for &ca in outer {
        for (j, &cb) in inner.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[inner.len()]
}

/// Short, log-safe identifier for an item (hash prefix, never raw text).
pub fn short_id(content_hash: &str) -> &str {
    let end = content_hash
        .char_indices()
        .nth(12)
        .map_or(content_hash.len(), |(i, _)| i);
    &content_hash[..end]
}
