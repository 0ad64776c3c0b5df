//! String similarity between entity names.

use similar::{Algorithm, TextDiff};

use crate::normalize::normalize;

/// Matching-blocks ratio of two strings, `2·M / (|a| + |b|)`.
///
/// `M` counts the characters inside matching blocks of a character-level
/// diff. Inputs are compared as given.
pub fn ratio(a: &str, b: &str) -> f64 {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(a, b);
    f64::from(diff.ratio()).clamp(0.0, 1.0)
}

/// Similarity in [0, 1] of two names after normalization and lower-casing.
///
/// Symmetric, and `similarity(a, a) == 1.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a).to_lowercase();
    let b = normalize(b).to_lowercase();
    if a == b {
        return 1.0;
    }
    // The diff is computed in a fixed argument order so the score cannot
    // depend on which name was passed first.
    if a <= b {
        ratio(&a, &b)
    } else {
        ratio(&b, &a)
    }
}
