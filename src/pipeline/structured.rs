//! Block-numbered exam layout: every passage opens with `NN. pNN...`.
//!
//! ## Layout
//!
//! ```text
//! 2025년 인제고1 2학기 중간고사            ← title (first 5 lines)
//! 1. p12-no.3 Reading Power                ← block start, source
//! Most people think that habits form ...   ← English, kept
//! 대부분의 사람들은 습관이 ...              ← Korean, dropped
//! 2. p14-no.1 Reading Power                ← next block
//! ```
//!
//! One pass over the lines with a single accumulator. A block is flushed
//! when the next block starts or input ends, and only if the cleaned text is
//! longer than 30 characters.

use crate::output::{ExtractionResult, ParserKind, Passage};
use crate::pipeline::classify::{is_english_line, is_korean_line};
use crate::pipeline::cleanup::{clean_passage, clean_title};
use crate::pipeline::text::PAGE_BREAK;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub(crate) const MIN_PASSAGE_CHARS: usize = 30;

static RE_TITLE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}년.*[가-힣]").unwrap());
static RE_TITLE_GRADE: Lazy<Regex> = Lazy::new(|| Regex::new(r"고[1-3].*[가-힣]").unwrap());

static RE_SOURCE_WITH_DESC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s*(p\d+[-–—].+?)$").unwrap());
static RE_SOURCE_PLAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s*(p\d+.*?)$").unwrap());

static RE_BLOCK_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\s*(p\d+.*?)$").unwrap());

/// Parser for dumps where each passage block opens with a numbered source line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredPdfParser;

struct OpenBlock {
    number: u32,
    source: String,
    page: usize,
    lines: Vec<String>,
}

impl StructuredPdfParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ExtractionResult {
        let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        let total_pages = pages.len();

        let title = extract_title(text);
        let sources = extract_sources(text);
        let passages = extract_passages(&pages);

        debug!(
            "structured parser: {} pages, {} sources, {} passages",
            total_pages,
            sources.len(),
            passages.len()
        );

        ExtractionResult::new(title, sources, passages, total_pages, ParserKind::Structured)
    }
}

/// First of the first five non-empty lines that looks like an exam title,
/// falling back to the first non-empty line.
pub fn extract_title(text: &str) -> String {
    let candidates: Vec<&str> = dump_lines(text)
        .filter(|l| !l.is_empty())
        .take(5)
        .collect();

    let raw = candidates
        .iter()
        .find(|l| RE_TITLE_YEAR.is_match(l) || RE_TITLE_GRADE.is_match(l))
        .or_else(|| candidates.first())
        .copied()
        .unwrap_or("");

    clean_title(raw)
}

/// Every source descriptor, in document order.
pub fn extract_sources(text: &str) -> Vec<String> {
    dump_lines(text)
        .filter_map(|line| {
            RE_SOURCE_WITH_DESC
                .captures(line)
                .or_else(|| RE_SOURCE_PLAIN.captures(line))
                .map(|caps| caps[1].trim().to_string())
        })
        .collect()
}

/// Trimmed lines of every page. A page break ends a line even when pdfium
/// left no newline before it.
fn dump_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(PAGE_BREAK).flat_map(str::lines).map(str::trim)
}

fn extract_passages(pages: &[&str]) -> Vec<Passage> {
    let mut passages = Vec::new();
    let mut current: Option<OpenBlock> = None;

    for (page_idx, page) in pages.iter().enumerate() {
        for line in page.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = RE_BLOCK_START.captures(line) {
                if let Some(block) = current.take() {
                    flush_block(block, &mut passages);
                }
                current = Some(OpenBlock {
                    number: caps[1].parse().unwrap_or(0),
                    source: caps[2].trim().to_string(),
                    page: page_idx + 1,
                    lines: Vec::new(),
                });
                continue;
            }

            if let Some(block) = current.as_mut() {
                if is_english_line(line) && !is_korean_line(line) {
                    block.lines.push(line.to_string());
                }
            }
        }
    }

    if let Some(block) = current.take() {
        flush_block(block, &mut passages);
    }

    passages
}

fn flush_block(block: OpenBlock, passages: &mut Vec<Passage>) {
    let text = clean_passage(&block.lines.join(" "));
    if text.chars().count() > MIN_PASSAGE_CHARS {
        passages.push(Passage {
            problem_number: block.number,
            passage: text,
            source: block.source,
            page: block.page,
        });
    } else {
        debug!(
            "dropping block {} ({}): {} chars after cleanup",
            block.number,
            block.source,
            text.chars().count()
        );
    }
}
