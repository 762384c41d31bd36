//! Result types shared by extraction and generation.
//!
//! Everything here is plain data: built once by a parser or generator and
//! never mutated afterwards. All types serialise with camelCase keys so the
//! JSON matches what the upload and problem-bank layers already store.

use serde::{Deserialize, Serialize};

/// One English passage recovered from an exam text dump.
///
/// `passage` always holds more than 30 characters; shorter fragments are
/// treated as extraction noise and never become a `Passage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    /// Item number printed before the source marker (`12. p34-...` → 12).
    pub problem_number: u32,
    /// Cleaned English text.
    pub passage: String,
    /// Source descriptor, e.g. `p34-no.2 Reading Skills`.
    pub source: String,
    /// 1-indexed page on which the block started.
    pub page: usize,
}

/// Which parser produced an [`ExtractionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    Structured,
    Mini,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub total_pages: usize,
    pub total_passages: usize,
    /// Unix time in milliseconds.
    pub extracted_at_ms: u64,
    pub parser: ParserKind,
}

/// Full output of one extraction run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub title: String,
    pub sources: Vec<String>,
    pub passages: Vec<Passage>,
    pub metadata: ExtractionMetadata,
}

impl ExtractionResult {
    pub(crate) fn new(
        title: String,
        sources: Vec<String>,
        passages: Vec<Passage>,
        total_pages: usize,
        parser: ParserKind,
    ) -> Self {
        let total_passages = passages.len();
        Self {
            title,
            sources,
            passages,
            metadata: ExtractionMetadata {
                total_pages,
                total_passages,
                extracted_at_ms: unix_millis(),
                parser,
            },
        }
    }

    /// Passage texts only, in extraction order.
    pub fn passage_texts(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.passage.clone()).collect()
    }
}

/// Provenance attached to every AI-generated problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMeta {
    pub generator: String,
    pub model: String,
    pub attempts: u32,
}

/// A problem together with how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedProblem {
    pub problem: crate::problem::Problem,
    pub meta: GenerationMeta,
}

pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_camel_case() {
        let result = ExtractionResult::new(
            "2025년 모의고사".into(),
            vec!["p12-no.1".into()],
            vec![Passage {
                problem_number: 1,
                passage: "The quick brown fox jumps over the lazy dog again.".into(),
                source: "p12-no.1".into(),
                page: 1,
            }],
            2,
            ParserKind::Structured,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["passages"][0]["problemNumber"], 1);
        assert_eq!(json["metadata"]["totalPages"], 2);
        assert_eq!(json["metadata"]["totalPassages"], 1);
        assert_eq!(json["metadata"]["parser"], "structured");
        assert!(json["metadata"]["extractedAtMs"].as_u64().unwrap() > 0);
    }
}
