// tests/fingerprint_props.rs
use digest_curator::canonicalize;
use digest_curator::fingerprint::{content_hash, fuzzy_hash, similarity, Fingerprint, FUZZY_HASH_LEN};
use proptest::prelude::*;

#[test]
fn hash_ignores_whitespace_tags_and_case() {
    let variants = [
        "Storm hits city as river floods",
        "  storm   HITS city\tas river\nfloods ",
        "<p>Storm <b>hits</b> city</p> as <i>river</i> floods",
        "STORM HITS CITY AS RIVER FLOODS",
    ];
    let first = content_hash(variants[0]);
    for v in &variants[1..] {
        assert_eq!(content_hash(v), first, "variant {v:?}");
    }
}

#[test]
fn blank_body_hashes_the_title() {
    let a = Fingerprint::of("Storm hits city", "");
    let b = Fingerprint::of("Quake rattles coast", "   ");
    assert_ne!(a.content_hash, b.content_hash);
    assert_eq!(a.content_hash, content_hash("storm hits city"));
}

#[test]
fn trailing_rare_word_keeps_fuzzy_hash() {
    let words: Vec<String> = (0..30).map(|i| format!("token{i:02}")).collect();
    let a = words.join(" ");
    let b = format!("{a} appendix");
    assert_eq!(fuzzy_hash(&a), fuzzy_hash(&b));
    assert_ne!(content_hash(&a), content_hash(&b));
    assert!(similarity(&a, &b) > 0.95);
}

proptest! {
    #[test]
    fn hash_is_deterministic(s in ".{0,200}") {
        prop_assert_eq!(content_hash(&s), content_hash(&s));
        prop_assert_eq!(fuzzy_hash(&s).len(), FUZZY_HASH_LEN);
    }

    #[test]
    fn canonical_form_has_no_stray_spaces(s in ".{0,200}") {
        let once = canonicalize(&s);
        prop_assert!(!once.starts_with(' ') && !once.ends_with(' '));
        prop_assert!(!once.contains("  "));
    }

    #[test]
    fn similarity_is_reflexive_symmetric_and_bounded(
        a in "[a-zA-Z ]{0,80}",
        b in "[a-zA-Z ]{0,80}",
    ) {
        prop_assert_eq!(similarity(&a, &a), 1.0);
        let ab = similarity(&a, &b);
        let ba = similarity(&b, &a);
        prop_assert_eq!(ab, ba);
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn case_and_spacing_do_not_change_hash(words in prop::collection::vec("[a-z]{1,8}", 1..12)) {
        let plain = words.join(" ");
        let noisy = words
            .iter()
            .map(|w| w.to_uppercase())
            .collect::<Vec<_>>()
            .join("  \n ");
        prop_assert_eq!(content_hash(&plain), content_hash(&noisy));
    }
}
