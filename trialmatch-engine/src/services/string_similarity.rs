//! String measures used by the fuzzy strategies

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Protocol identifier without a trailing version or amendment suffix
///
/// `ABC-101_V2` → `ABC-101`, `XYZ-7-AMD1` → `XYZ-7`. Input is expected
/// upper-cased. A bare numeric tail such as `-101` is kept.
pub fn strip_version_suffix(identifier: &str) -> &str {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    let pattern = SUFFIX.get_or_init(|| {
        Regex::new(r"[_\-\s]?(V|VER|VERSION|AMEND|AMD)\.?\d+(\.\d+)?$").expect("static suffix pattern")
    });

    match pattern.find(identifier) {
        Some(m) if m.start() > 0 => &identifier[..m.start()],
        _ => identifier,
    }
}

/// Similarity of two protocol identifiers in [0, 1]
///
/// Equal → 1.0; equal once version suffixes are stripped →
/// `stripped_equal_score`; otherwise normalized Levenshtein.
pub fn identifier_similarity(a: &str, b: &str, stripped_equal_score: f64) -> f64 {
    let a = a.trim().to_uppercase();
    let b = b.trim().to_uppercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if strip_version_suffix(&a) == strip_version_suffix(&b) {
        return stripped_equal_score;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Dice coefficient over lower-cased, punctuation-free word sets
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = title_tokens(a);
    let b = title_tokens(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    (2 * shared) as f64 / (a.len() + b.len()) as f64
}

fn title_tokens(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_suffixes_are_stripped() {
        assert_eq!(strip_version_suffix("ABC-101_V2"), "ABC-101");
        assert_eq!(strip_version_suffix("ABC-101-V1.1"), "ABC-101");
        assert_eq!(strip_version_suffix("XYZ-7-AMD1"), "XYZ-7");
        assert_eq!(strip_version_suffix("XYZ-7_AMEND3"), "XYZ-7");
        assert_eq!(strip_version_suffix("ABC-101"), "ABC-101");
        assert_eq!(strip_version_suffix("V2"), "V2");
    }

    #[test]
    fn version_drift_scores_stripped_equal() {
        assert_eq!(identifier_similarity("ABC-101_v1", "ABC-101_v2", 0.9), 0.9);
        assert_eq!(identifier_similarity("abc-101", "ABC-101", 0.9), 1.0);
    }

    #[test]
    fn unrelated_identifiers_score_low() {
        assert!(identifier_similarity("ABC-101", "QRS-999", 0.9) < 0.7);
        assert_eq!(identifier_similarity("", "QRS-999", 0.9), 0.0);
    }

    #[test]
    fn title_similarity_ignores_case_and_punctuation() {
        let score = title_similarity(
            "A Phase 2 Study of Drug-X in Adults",
            "a phase 2 study of drug x, in adults!",
        );
        assert_eq!(score, 1.0);
    }

    #[test]
    fn title_similarity_is_partial_overlap() {
        let score = title_similarity("study of drug x", "study of drug y");
        assert!((score - 0.75).abs() < 1e-9);
        assert_eq!(title_similarity("", "study"), 0.0);
    }
}
