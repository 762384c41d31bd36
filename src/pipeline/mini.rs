//! Page-keyed exam layout: several passages per page, each opened by a
//! source line and optionally closed by a summary separator.
//!
//! ```text
//! 2025 올림포스 독해의 기본1 본문 정리       ← page title
//! 1. p8~9-no.2                             ← source line, region 1 starts
//! Children learn language by listening ...  ← kept
//! ---> 요약: ...                            ← separator, stop collecting
//! 2. p10-no.1                              ← region 2 starts
//! ...
//! \f                                       ← next page
//! ```
//!
//! Unlike the structured layout, one block of numbering can hold several
//! passages, and hyphenated line breaks are repaired before joining.

use crate::output::{ExtractionResult, ParserKind, Passage};
use crate::pipeline::classify::{classify_line, contains_hangul, LineKind};
use crate::pipeline::cleanup::{clean_title, collapse_whitespace, join_hyphenated};
use crate::pipeline::structured::MIN_PASSAGE_CHARS;
use crate::pipeline::text::PAGE_BREAK;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Raw lines, blanks included, at the top of a page scanned for a title.
const TITLE_SCAN_LINES: usize = 10;

/// Publisher watermarks that look like titles but never are.
const WATERMARKS: &[&str] = &["무단전재", "무단 전재", "무단복제", "배포금지", "저작권", "www."];

static RE_SOURCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\.\s*(p\d+(?:~\d+)?(?:[-–—].*)?)").unwrap());

static RE_QUESTION_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Q\.").unwrap());

/// Parser for dumps keyed by page breaks.
#[derive(Debug, Default, Clone, Copy)]
pub struct MiniPdfParser;

impl MiniPdfParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ExtractionResult {
        let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        let mut title = String::new();
        let mut sources = Vec::new();
        let mut passages = Vec::new();

        for (idx, page) in pages.iter().enumerate() {
            let lines: Vec<&str> = page.lines().map(str::trim).collect();

            if title.is_empty() {
                if let Some(found) = page_title(&lines) {
                    title = found;
                }
            }

            let page_passages = page_passages(&lines, idx + 1, &mut sources);
            debug!("mini parser: page {} → {} passages", idx + 1, page_passages.len());
            passages.extend(page_passages);
        }

        ExtractionResult::new(title, sources, passages, pages.len(), ParserKind::Mini)
    }
}

fn page_title(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .take(TITLE_SCAN_LINES)
        .find(|l| {
            !l.is_empty()
                && contains_hangul(l)
                && !RE_QUESTION_PREFIX.is_match(l)
                && !WATERMARKS.iter().any(|w| l.contains(w))
        })
        .map(|l| clean_title(l))
        .filter(|t| !t.is_empty())
}

fn page_passages(lines: &[&str], page: usize, sources: &mut Vec<String>) -> Vec<Passage> {
    // (line index, problem number, source descriptor)
    let starts: Vec<(usize, u32, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            RE_SOURCE_LINE.captures(line).map(|caps| {
                (
                    i,
                    caps[1].parse().unwrap_or(0),
                    collapse_whitespace(caps[2].trim()),
                )
            })
        })
        .collect();

    let mut passages = Vec::new();
    for (n, (start, number, source)) in starts.iter().enumerate() {
        sources.push(source.clone());
        let end = starts.get(n + 1).map(|s| s.0).unwrap_or(lines.len());

        let mut collected: Vec<String> = Vec::new();
        for line in &lines[start + 1..end] {
            match classify_line(line) {
                LineKind::Separator => break,
                LineKind::English => collected.push((*line).to_string()),
                _ => {}
            }
        }

        let text = join_hyphenated(&collected);
        if text.chars().count() > MIN_PASSAGE_CHARS {
            passages.push(Passage {
                problem_number: *number,
                passage: text,
                source: source.clone(),
                page,
            });
        }
    }
    passages
}
