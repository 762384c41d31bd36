//! Structural acceptance check for candidate problems.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Problem types answered in free text; they carry no options.
pub const NO_OPTION_TYPES: [&str; 4] = ["essay", "writing", "subjective", "descriptive"];

static NUMERIC_ANSWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

pub fn requires_options(kind: &str) -> bool {
    !NO_OPTION_TYPES.contains(&kind)
}

/// `true` when `problem` may be persisted.
///
/// Needs non-empty string `type` and `question`. Unless the type is in
/// [`NO_OPTION_TYPES`], `options` must hold at least two non-empty strings
/// and `answer` must be a 1-based index string within bounds. Any other
/// shape, non-objects included, is rejected.
pub fn is_valid(problem: &Value) -> bool {
    let Some(obj) = problem.as_object() else {
        return false;
    };

    let kind = match obj.get("type").and_then(Value::as_str) {
        Some(k) if !k.is_empty() => k,
        _ => return false,
    };
    match obj.get("question").and_then(Value::as_str) {
        Some(q) if !q.is_empty() => {}
        _ => return false,
    }

    if !requires_options(kind) {
        return true;
    }

    let Some(options) = obj.get("options").and_then(Value::as_array) else {
        return false;
    };
    if options.len() < 2 {
        return false;
    }
    let all_filled = options
        .iter()
        .all(|o| o.as_str().is_some_and(|s| !s.is_empty()));
    if !all_filled {
        return false;
    }

    let Some(answer) = obj.get("answer").and_then(Value::as_str) else {
        return false;
    };
    if !NUMERIC_ANSWER.is_match(answer) {
        return false;
    }
    match answer.parse::<usize>() {
        Ok(n) => (1..=options.len()).contains(&n),
        Err(_) => false,
    }
}
