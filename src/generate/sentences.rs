//! Sentence splitting shared by the rule-based generators.

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]+[.!?]+").unwrap());

/// Split on terminal punctuation. Text after the last `.`, `!` or `?` is
/// dropped, as is anything that trims to nothing.
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE
        .find_iter(text)
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
