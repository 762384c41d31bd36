//! Payload normalisation for vocabulary-usage problems.
//!
//! The model is asked for a JSON object; [`VocabularyNormalizer`] checks it
//! against the variant and turns it into a [`Problem`]. Every rejection is an
//! [`AttemptError::Normalize`] whose detail is fed back into the next prompt,
//! so the messages are written for the model to read.

use super::vocabulary::{VocabularyTarget, VocabularyVariant};
use super::CIRCLED;
use crate::error::AttemptError;
use crate::pipeline::cleanup::collapse_whitespace;
use crate::problem::Problem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Number of underlined spans, options and reasons in a vocabulary item.
pub const SPAN_COUNT: usize = 5;

static UNDERLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<u>(.*?)</u>").unwrap());

static OPTION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[①②③④⑤]|\(\d\)|\d[.)])\s*").unwrap());

/// Turns a parsed model payload into a problem, or says why it can't.
pub trait PayloadNormalizer: Send + Sync {
    fn normalize(&self, payload: &Value, variant: &VocabularyVariant)
        -> Result<Problem, AttemptError>;
}

impl<F> PayloadNormalizer for F
where
    F: Fn(&Value, &VocabularyVariant) -> Result<Problem, AttemptError> + Send + Sync,
{
    fn normalize(
        &self,
        payload: &Value,
        variant: &VocabularyVariant,
    ) -> Result<Problem, AttemptError> {
        self(payload, variant)
    }
}

/// One misused span and its fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// 1-based span index.
    pub index: usize,
    pub original: String,
    pub replacement: String,
}

/// The default normaliser.
#[derive(Debug, Default, Clone, Copy)]
pub struct VocabularyNormalizer;

impl PayloadNormalizer for VocabularyNormalizer {
    fn normalize(
        &self,
        payload: &Value,
        variant: &VocabularyVariant,
    ) -> Result<Problem, AttemptError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| reject("payload must be a JSON object"))?;

        let question = match obj.get("question").and_then(Value::as_str).map(str::trim) {
            Some(q) if !q.is_empty() => q.to_string(),
            _ => variant.question.clone(),
        };

        let passage = obj
            .get("passage")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| reject("`passage` must be a non-empty string"))?;
        let spans = underlined_spans(passage)?;

        let options = normalized_options(obj.get("options"), &spans)?;
        let answer = parse_index(obj.get("answer"))
            .ok_or_else(|| reject("`answer` must be a single option number from 1 to 5"))?;

        let explanation = obj
            .get("explanation")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| reject("`explanation` must be a non-empty string"))?
            .to_string();

        let reasons = option_reasons(obj.get("optionReasons"))?;
        let corrections = corrections(obj, &spans)?;

        if corrections.len() != variant.incorrect_count as usize {
            return Err(reject(format!(
                "expected {} corrections (one per misused word), found {}",
                variant.incorrect_count,
                corrections.len()
            )));
        }
        let answer_is_misused = corrections.iter().any(|c| c.index == answer);
        match variant.target {
            VocabularyTarget::Incorrect if !answer_is_misused => {
                return Err(reject(format!(
                    "answer {answer} must be the misused word, but no correction covers it"
                )));
            }
            VocabularyTarget::Correct if answer_is_misused => {
                return Err(reject(format!(
                    "answer {answer} must be the only correctly used word, but it has a correction"
                )));
            }
            _ => {}
        }

        Ok(Problem {
            kind: "vocabulary".to_string(),
            question: format!("{question}\n\n{}", numbered_passage(passage)),
            options: Some(options),
            answer: answer.to_string(),
            explanation: Some(explanation),
            metadata: Some(json!({
                "variant": variant.id,
                "target": variant.target,
                "passage": passage,
                "spans": spans,
                "optionReasons": reasons,
                "corrections": corrections,
            })),
        })
    }
}

fn reject(detail: impl Into<String>) -> AttemptError {
    AttemptError::Normalize {
        detail: detail.into(),
    }
}

fn normalize_text(s: &str) -> String {
    collapse_whitespace(s).trim().to_lowercase()
}

/// The five `<u>…</u>` spans of `passage`, trimmed.
pub fn underlined_spans(passage: &str) -> Result<Vec<String>, AttemptError> {
    let spans: Vec<String> = UNDERLINE
        .captures_iter(passage)
        .map(|c| collapse_whitespace(&c[1]).trim().to_string())
        .collect();
    if spans.len() != SPAN_COUNT {
        return Err(reject(format!(
            "expected {SPAN_COUNT} underlined spans (<u>…</u>) in passage, found {}",
            spans.len()
        )));
    }
    if let Some(i) = spans.iter().position(|s| s.is_empty()) {
        return Err(reject(format!("underlined span {} is empty", i + 1)));
    }
    Ok(spans)
}

/// Prefix each underlined span with its circled number.
fn numbered_passage(passage: &str) -> String {
    let mut n = 0usize;
    UNDERLINE
        .replace_all(passage, |caps: &regex::Captures<'_>| {
            let label = CIRCLED.get(n).copied().unwrap_or("");
            n += 1;
            format!("{label}<u>{}</u>", &caps[1])
        })
        .into_owned()
}

fn normalized_options(raw: Option<&Value>, spans: &[String]) -> Result<Vec<String>, AttemptError> {
    let items = raw
        .and_then(Value::as_array)
        .ok_or_else(|| reject("`options` must be an array of five strings"))?;
    if items.len() != SPAN_COUNT {
        return Err(reject(format!(
            "`options` must have {SPAN_COUNT} entries, found {}",
            items.len()
        )));
    }

    let mut out = Vec::with_capacity(SPAN_COUNT);
    for (i, (item, span)) in items.iter().zip(spans).enumerate() {
        let text = item
            .as_str()
            .ok_or_else(|| reject(format!("option {} must be a string", i + 1)))?;
        let bare = OPTION_MARKER.replace(text, "");
        if normalize_text(&bare) != normalize_text(span) {
            return Err(reject(format!(
                "option {} (\"{}\") does not match underlined span \"{}\"",
                i + 1,
                bare.trim(),
                span
            )));
        }
        out.push(format!("{} {}", CIRCLED[i], span));
    }
    Ok(out)
}

/// A 1-based index in `1..=5`, given as a number or a digit string.
fn parse_index(raw: Option<&Value>) -> Option<usize> {
    let n = match raw? {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => {
            let bare = OPTION_MARKER.replace(s, "");
            let bare = bare.trim();
            match CIRCLED.iter().position(|c| *c == s.trim()) {
                Some(i) => i + 1,
                None => bare.parse().ok()?,
            }
        }
        _ => return None,
    };
    (1..=SPAN_COUNT).contains(&n).then_some(n)
}

fn option_reasons(raw: Option<&Value>) -> Result<Vec<String>, AttemptError> {
    let missing = || reject("`optionReasons` must give a non-empty reason for each of the five options");
    let reasons: Vec<Option<String>> = match raw {
        Some(Value::Object(map)) => (1..=SPAN_COUNT)
            .map(|i| reason_text(map.get(&i.to_string())))
            .collect(),
        Some(Value::Array(items)) if items.len() == SPAN_COUNT => {
            items.iter().map(|v| reason_text(Some(v))).collect()
        }
        _ => return Err(missing()),
    };
    reasons.into_iter().collect::<Option<Vec<_>>>().ok_or_else(missing)
}

fn reason_text(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn corrections(obj: &Map<String, Value>, spans: &[String]) -> Result<Vec<Correction>, AttemptError> {
    let raw: Vec<&Value> = match (obj.get("corrections"), obj.get("correction")) {
        (Some(Value::Array(items)), _) => items.iter().collect(),
        (_, Some(single)) if single.is_object() => vec![single],
        (Some(single), _) if single.is_object() => vec![single],
        _ => return Err(reject("`corrections` must list each misused word with its replacement")),
    };

    let mut out: Vec<Correction> = Vec::with_capacity(raw.len());
    for (n, item) in raw.into_iter().enumerate() {
        let map = item
            .as_object()
            .ok_or_else(|| reject(format!("correction {} must be an object", n + 1)))?;
        let index = parse_index(map.get("index")).ok_or_else(|| {
            reject(format!("correction {} needs an `index` from 1 to 5", n + 1))
        })?;
        if out.iter().any(|c| c.index == index) {
            return Err(reject(format!("span {index} is corrected twice")));
        }
        let span = &spans[index - 1];
        let original = match reason_text(map.get("original")) {
            Some(o) if normalize_text(&o) != normalize_text(span) => {
                return Err(reject(format!(
                    "correction for span {index} names \"{o}\" but the span reads \"{span}\""
                )));
            }
            _ => span.clone(),
        };
        let replacement = reason_text(map.get("replacement")).ok_or_else(|| {
            reject(format!("correction for span {index} needs a `replacement`"))
        })?;
        if normalize_text(&replacement) == normalize_text(span) {
            return Err(reject(format!(
                "replacement for span {index} repeats the original word"
            )));
        }
        out.push(Correction {
            index,
            original,
            replacement,
        });
    }
    out.sort_by_key(|c| c.index);
    Ok(out)
}
