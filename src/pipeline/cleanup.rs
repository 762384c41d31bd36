//! Cleanup: deterministic text rules applied before parsing, to passages
//! after parsing, and to raw model replies before JSON decoding.
//!
//! PDF text layers and chat models both introduce artefacts that are
//! meaningless to the parsers:
//!
//! - `\r\n` line endings and zero-width characters from the PDF producer
//! - source headers glued into the middle of a passage by column merging
//! - words hyphenated across line breaks
//! - ` ```json ... ``` ` fences around a JSON reply despite the prompt
//!
//! Each rule is a pure `&str → String` function so it can be tested alone.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise a raw text dump before it reaches a parser.
///
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
///
/// Form feeds are kept: they are the page separators.
pub fn normalise_dump(input: &str) -> String {
    let s = normalise_line_endings(input);
    remove_invisible_chars(&s)
}

/// Clean an accumulated passage.
///
/// 1. Strip embedded `NN. pNN-...` source headers
/// 2. Collapse whitespace runs
/// 3. Collapse repeated periods
pub fn clean_passage(input: &str) -> String {
    let s = RE_EMBEDDED_SOURCE.replace_all(input, " ");
    let s = collapse_whitespace(&s);
    let s = RE_REPEATED_PERIODS.replace_all(&s, ".");
    s.trim().to_string()
}

/// Clean an extracted title: drop boilerplate suffixes, collapse spacing.
pub fn clean_title(input: &str) -> String {
    let s = RE_TITLE_BOILERPLATE.replace(input, "");
    collapse_whitespace(&s).trim().to_string()
}

/// Join passage lines, gluing a line that ends in `-` onto the next one.
///
/// `["environ-", "mental issues"]` becomes `"environmental issues"`; lines
/// without a trailing hyphen are joined with single spaces.
pub fn join_hyphenated(lines: &[String]) -> String {
    let mut merged: Vec<String> = Vec::with_capacity(lines.len());
    let mut carry: Option<String> = None;

    for line in lines {
        let line = line.trim();
        let current = match carry.take() {
            Some(head) => format!("{}{}", head, line),
            None => line.to_string(),
        };
        if let Some(stripped) = current.strip_suffix('-') {
            if stripped.ends_with(|c: char| c.is_ascii_alphabetic()) {
                carry = Some(stripped.to_string());
                continue;
            }
        }
        merged.push(current);
    }
    if let Some(rest) = carry {
        merged.push(format!("{}-", rest));
    }

    collapse_whitespace(&merged.join(" ")).trim().to_string()
}

/// Extract a JSON value from a raw model reply.
///
/// Tries the fence-stripped text first, then the outermost `{...}` slice so
/// a chatty preamble does not sink an otherwise valid payload.
pub fn parse_model_json(raw: &str) -> Result<serde_json::Value, String> {
    let stripped = strip_code_fences(raw);
    match serde_json::from_str(stripped.trim()) {
        Ok(value) => Ok(value),
        Err(first) => {
            let start = stripped.find('{');
            let end = stripped.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if e > s => serde_json::from_str(&stripped[s..=e])
                    .map_err(|e| format!("{} (after trimming to braces)", e)),
                _ => Err(first.to_string()),
            }
        }
    }
}

// ── Rule: Strip outer code fences ────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

pub fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.trim().to_string()
    }
}

// ── Rule: Normalise line endings ─────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule: Remove invisible Unicode characters ────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule: Collapse whitespace ────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

pub fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").to_string()
}

// ── Rule: Embedded source headers and repeated periods ──────────────────────

static RE_EMBEDDED_SOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+\.\s*p\d+(?:~\d+)?[-–—]\S*").unwrap());

static RE_REPEATED_PERIODS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").unwrap());

// ── Rule: Title boilerplate ──────────────────────────────────────────────────

static RE_TITLE_BOILERPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:Q\.\s*본문과.*|본문해석지.*)$").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_dump() {
        assert_eq!(normalise_dump("a\r\nb\u{200B}c\rd\u{000C}e"), "a\nbc\nd\u{000C}e");
    }

    #[test]
    fn test_clean_passage_strips_embedded_header() {
        let input = "The results were clear. 12. p34-no.2 Researchers then  moved on..";
        assert_eq!(
            clean_passage(input),
            "The results were clear. Researchers then moved on."
        );
    }

    #[test]
    fn test_clean_title_strips_suffix() {
        assert_eq!(
            clean_title("2025년 인제고1  중간고사 Q. 본문과 일치하는 것은?"),
            "2025년 인제고1 중간고사"
        );
        assert_eq!(clean_title("고2 모의고사 본문해석지 (학생용)"), "고2 모의고사");
        assert_eq!(
            clean_title("2025년인제고1학년2학기중간고사_올림포스2"),
            "2025년인제고1학년2학기중간고사_올림포스2"
        );
    }

    #[test]
    fn test_join_hyphenated() {
        let lines = vec![
            "Most people care about environ-".to_string(),
            "mental issues more than they admit.".to_string(),
        ];
        assert_eq!(
            join_hyphenated(&lines),
            "Most people care about environmental issues more than they admit."
        );
    }

    #[test]
    fn test_join_keeps_dangling_hyphen_at_end() {
        let lines = vec!["a well-".to_string()];
        assert_eq!(join_hyphenated(&lines), "a well-");
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_model_json_with_preamble() {
        let raw = "Sure! Here is the problem:\n{\"question\": \"Q\"}\nHope it helps.";
        let value = parse_model_json(raw).unwrap();
        assert_eq!(value["question"], "Q");
    }

    #[test]
    fn test_parse_model_json_rejects_garbage() {
        assert!(parse_model_json("not json at all").is_err());
    }
}
