//! Best-effort normaliser for multiple-choice problems.
//!
//! Repair only fixes structure: the result passes [`super::is_valid`] in
//! the common cases but may still be wrong about which option is correct.

use super::validate::requires_options;
use super::Problem;
use serde_json::{Map, Value};
use tracing::debug;

const ANSWER_TEXT_KEYS: [&str; 3] = ["correctText", "correctAnswer", "correctOption"];

/// Return a repaired copy of `problem`; the input is left untouched.
///
/// * options come from `options`, or from `choices` when `options` is
///   missing; entries are trimmed, blanks dropped, duplicates removed, and
///   the list padded to two with `"Option N"` labels
/// * `answer` keeps an in-range index, else matches `correctText`,
///   `correctAnswer` or `correctOption` against the options ignoring case,
///   else falls back to `"1"`
/// * an input that carried `choices` gets a `choices` copy of the options
///
/// Free-text types and non-objects come back unchanged. Applying it twice
/// gives the same result as applying it once.
pub fn repair_mcq(problem: &Value) -> Value {
    let Some(obj) = problem.as_object() else {
        return problem.clone();
    };
    let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
    if !requires_options(kind) {
        return problem.clone();
    }

    let source = obj
        .get("options")
        .filter(|v| v.is_array())
        .or_else(|| obj.get("choices"));
    let options = pad_options(collect_options(source));

    let answer = existing_answer(obj.get("answer"), options.len())
        .or_else(|| answer_from_text(obj, &options))
        .unwrap_or(1);

    let mut out: Map<String, Value> = obj.clone();
    let as_values: Vec<Value> = options.iter().cloned().map(Value::String).collect();
    out.insert("options".into(), Value::Array(as_values.clone()));
    out.insert("answer".into(), Value::String(answer.to_string()));
    if obj.contains_key("choices") {
        out.insert("choices".into(), Value::Array(as_values));
    }
    Value::Object(out)
}

/// Typed convenience over [`repair_mcq`].
pub fn repair_problem(problem: &Problem) -> Problem {
    let repaired = repair_mcq(&problem.to_value());
    match serde_json::from_value(repaired) {
        Ok(p) => p,
        Err(e) => {
            debug!("repaired problem no longer deserialises: {}", e);
            problem.clone()
        }
    }
}

fn collect_options(source: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = source else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let text = match item {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if !text.is_empty() && !out.contains(&text) {
            out.push(text);
        }
    }
    out
}

fn pad_options(mut options: Vec<String>) -> Vec<String> {
    let mut n = options.len() + 1;
    while options.len() < 2 {
        let label = format!("Option {n}");
        if !options.contains(&label) {
            options.push(label);
        }
        n += 1;
    }
    options
}

fn existing_answer(answer: Option<&Value>, len: usize) -> Option<usize> {
    let n = match answer? {
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse::<usize>().ok()?
        }
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    (1..=len).contains(&n).then_some(n)
}

fn answer_from_text(obj: &Map<String, Value>, options: &[String]) -> Option<usize> {
    ANSWER_TEXT_KEYS.iter().find_map(|key| {
        let wanted = obj.get(*key)?.as_str()?.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        options
            .iter()
            .position(|o| o.to_lowercase() == wanted)
            .map(|i| i + 1)
    })
}
