//! Line classification for exam text dumps.
//!
//! Exam PDFs interleave the English passage with Korean translations,
//! question stems, source markers (`12. p34-no.2 ...`) and summary separators.
//! Both parsers decide line by line what to keep, so the decision lives here
//! as a handful of pure functions.
//!
//! The ratio thresholds are load-bearing: 0.5 for Korean, 0.3 plus a
//! 10-letter floor for English. Lowering the English floor lets short Korean
//! lines with an English word or two leak into passages.

use once_cell::sync::Lazy;
use regex::Regex;

/// What a single line of extracted text looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Mostly Hangul.
    Korean,
    /// Mostly Latin letters with enough of them to be prose.
    English,
    /// `NN. pNN...` marker that opens a passage block.
    SourceMarker,
    /// Leading dashes or arrows; marks the start of a summary section.
    Separator,
    /// Blank, symbolic, numeric or mixed lines.
    Other,
}

static RE_SOURCE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*p\d+").unwrap());

static RE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:-{2,}|[─━—–]+|[→⇒➔➜▶►]+)").unwrap());

/// Classify one line.
///
/// Source markers and separators take precedence over the language checks,
/// then Korean over English.
pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Other;
    }
    if RE_SOURCE_MARKER.is_match(trimmed) {
        return LineKind::SourceMarker;
    }
    if is_separator_line(trimmed) {
        return LineKind::Separator;
    }
    if is_korean_line(trimmed) {
        return LineKind::Korean;
    }
    if is_english_line(trimmed) {
        return LineKind::English;
    }
    LineKind::Other
}

/// True when Hangul makes up more than half of the letter-like characters.
pub fn is_korean_line(line: &str) -> bool {
    let counted = line
        .chars()
        .filter(|&c| !c.is_ascii_digit() && !c.is_whitespace() && !is_punctuation(c))
        .count();
    if counted == 0 {
        return false;
    }
    let korean = line.chars().filter(|&c| is_hangul(c)).count();
    korean as f64 / counted as f64 > 0.5
}

/// True when the line has at least 10 Latin letters and they make up more
/// than 30% of the letter-like characters.
pub fn is_english_line(line: &str) -> bool {
    let latin = line.chars().filter(|c| c.is_ascii_alphabetic()).count();
    if latin < 10 {
        return false;
    }
    let counted = line
        .chars()
        .filter(|&c| {
            !c.is_ascii_digit() && !c.is_whitespace() && !is_punctuation(c) && !is_paren(c)
        })
        .count();
    if counted == 0 {
        return false;
    }
    latin as f64 / counted as f64 > 0.3
}

pub fn is_separator_line(line: &str) -> bool {
    RE_SEPARATOR.is_match(line.trim_start())
}

pub fn is_source_marker(line: &str) -> bool {
    RE_SOURCE_MARKER.is_match(line.trim())
}

pub(crate) fn is_hangul(c: char) -> bool {
    matches!(c, '가'..='힣' | 'ㄱ'..='ㅎ' | 'ㅏ'..='ㅣ')
}

pub(crate) fn contains_hangul(line: &str) -> bool {
    line.chars().any(is_hangul)
}

fn is_paren(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '（' | '）' | '「' | '」' | '『' | '』')
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(
            c,
            '‘' | '’'
                | '“'
                | '”'
                | '–'
                | '—'
                | '…'
                | '·'
                | '。'
                | '、'
                | '《'
                | '》'
                | '〈'
                | '〉'
                | '【'
                | '】'
                | '※'
                | '①'..='⑳'
        )
}
