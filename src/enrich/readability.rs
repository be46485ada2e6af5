//! Readability and coherence heuristics.
//!
//! Cheap, deterministic text statistics: grade-level formulas over
//! estimated syllables, unique-token ratios, and lexical overlap between
//! consecutive sentences. Every function tolerates degenerate input and
//! falls back to 0.0 rather than failing.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// Flesch-Kincaid grade level.
///
/// Returns 0.0 for empty text; single-sentence input is fine.
pub fn flesch_kincaid_grade(text: &str) -> f64 {
    let words: Vec<&str> = text.unicode_words().collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = sentence_count(text).max(1) as f64;
    let word_count = words.len() as f64;
    let syllables: usize = words.iter().map(|w| syllable_count(w)).sum();

    let grade =
        0.39 * (word_count / sentences) + 11.8 * (syllables as f64 / word_count) - 15.59;
    finite_or_zero(grade)
}

/// Gunning fog index.
///
/// Complex words are those with three or more estimated syllables.
pub fn gunning_fog_index(text: &str) -> f64 {
    let words: Vec<&str> = text.unicode_words().collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = sentence_count(text).max(1) as f64;
    let word_count = words.len() as f64;
    let complex = words.iter().filter(|w| syllable_count(w) >= 3).count() as f64;

    let fog = 0.4 * ((word_count / sentences) + 100.0 * (complex / word_count));
    finite_or_zero(fog)
}

/// Unique-token ratio over whitespace-delimited tokens, case-insensitive.
pub fn lexical_diversity(text: &str) -> f64 {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
    unique.len() as f64 / tokens.len() as f64
}

/// Mean lexical overlap across consecutive sentence pairs.
///
/// A text with exactly one sentence is maximally coherent by definition;
/// empty text scores 0.0.
pub fn coherence(text: &str) -> f64 {
    let sentences = split_sentence_texts(text);
    match sentences.len() {
        0 => 0.0,
        1 => 1.0,
        _ => {
            let sets: Vec<HashSet<String>> = sentences
                .iter()
                .map(|s| s.unicode_words().map(|w| w.to_lowercase()).collect())
                .collect();
            let mut total = 0.0;
            let mut pairs = 0usize;
            for pair in sets.windows(2) {
                total += jaccard(&pair[0], &pair[1]);
                pairs += 1;
            }
            finite_or_zero(total / pairs as f64)
        }
    }
}

/// Jaccard similarity of two word sets.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// Count sentences by terminator runs; unterminated text is one sentence.
fn sentence_count(text: &str) -> usize {
    split_sentence_texts(text).len()
}

/// Split text into non-empty sentence fragments on terminator runs.
fn split_sentence_texts(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Estimate syllables by counting vowel groups.
///
/// A trailing silent 'e' is discounted; every word with at least one
/// letter counts one syllable minimum.
fn syllable_count(word: &str) -> usize {
    let lower = word.to_lowercase();
    let mut groups = 0usize;
    let mut in_group = false;
    for c in lower.chars() {
        let is_vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !in_group {
            groups += 1;
        }
        in_group = is_vowel;
    }
    if groups > 1 && lower.ends_with('e') && !lower.ends_with("le") {
        groups -= 1;
    }
    if groups == 0 && lower.chars().any(|c| c.is_alphabetic()) {
        groups = 1;
    }
    groups
}

/// Substitute 0.0 for any non-finite metric result.
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
