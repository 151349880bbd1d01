// src/ingest/mod.rs
pub mod store;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Canonical comparable form of raw title/body text.
///
/// Steps: decode HTML entities, strip tags, drop punctuation (word characters,
/// whitespace and CJK ideographs survive), lower-case ASCII, collapse whitespace.
/// Pure and infallible; malformed or empty input simply yields `""`.
pub fn canonicalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    // 1) HTML entity decode
    let decoded = html_escape::decode_html_entities(raw);

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    let stripped = re_tags.replace_all(&decoded, "");

    // 3) Punctuation + case, 4) whitespace collapse in the same pass
    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for ch in stripped.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !is_kept(ch) {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch.to_ascii_lowercase());
    }
    out
}

fn is_kept(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || is_cjk_ideograph(ch)
}

fn is_cjk_ideograph(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_punctuation() {
        let s = "  <p>Storm&nbsp;hits <b>City</b>!!!</p>  ";
        assert_eq!(canonicalize(s), "storm hits city");
    }

    #[test]
    fn whitespace_left_by_removed_punctuation_collapses() {
        assert_eq!(canonicalize("rates - up, again"), "rates up again");
    }

    #[test]
    fn keeps_cjk_ideographs() {
        assert_eq!(canonicalize("新闻，标题！News"), "新闻标题news");
    }

    #[test]
    fn empty_and_markup_only_are_empty() {
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("<div><br/></div>"), "");
        assert_eq!(canonicalize("?!..."), "");
    }
}
