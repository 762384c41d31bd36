//! Problem generators and the persistence gate.
//!
//! * [`order`] and [`insertion`] are rule-based and need no model.
//! * [`vocabulary`] drives a model through the [`crate::queue`] and checks
//!   its payload with a [`normalize::PayloadNormalizer`].
//!
//! [`generate_from_document`] ties a stored document to a generator, and
//! [`finalize_problem`] is the last check before a problem is persisted.

pub mod insertion;
pub mod normalize;
pub mod order;
pub mod sentences;
pub mod vocabulary;

pub use insertion::generate_insertion_problem;
pub use normalize::{PayloadNormalizer, VocabularyNormalizer};
pub use order::{generate_order_problem, Difficulty};
pub use vocabulary::{
    FailureLog, PayloadRepairer, QueueRepairer, VocabularyPipeline, VocabularyRequest,
    VocabularyTarget, VocabularyVariant,
};

use crate::document::{get_document_context, DocumentStore};
use crate::error::ForgeError;
use crate::output::{GeneratedProblem, GenerationMeta};
use crate::problem::{is_valid, repair_mcq, Problem};
use tracing::{info, warn};

/// Circled option labels, in order.
pub const CIRCLED: [&str; 5] = ["①", "②", "③", "④", "⑤"];

/// What to generate for a passage.
#[derive(Debug, Clone, PartialEq)]
pub enum ProblemKind {
    Order(Difficulty),
    Insertion,
    Vocabulary(VocabularyVariant),
}

fn rule_based(generator: &str, problem: Problem) -> GeneratedProblem {
    GeneratedProblem {
        problem,
        meta: GenerationMeta {
            generator: generator.to_string(),
            model: "none".to_string(),
            attempts: 1,
        },
    }
}

/// Build one problem of `kind` from `passage`.
///
/// Vocabulary problems need a pipeline; without one this fails with
/// [`ForgeError::ProviderNotConfigured`].
pub async fn generate_for_passage(
    kind: &ProblemKind,
    passage: &str,
    passage_index: usize,
    pipeline: Option<&VocabularyPipeline>,
) -> Result<GeneratedProblem, ForgeError> {
    match kind {
        ProblemKind::Order(difficulty) => Ok(rule_based(
            "order",
            generate_order_problem(passage, *difficulty)?,
        )),
        ProblemKind::Insertion => Ok(rule_based(
            "insertion",
            generate_insertion_problem(passage)?,
        )),
        ProblemKind::Vocabulary(variant) => {
            let pipeline = pipeline.ok_or_else(|| ForgeError::ProviderNotConfigured {
                provider: "none".to_string(),
                hint: "Vocabulary problems need a model. Set OPENAI_API_KEY or pass --provider."
                    .to_string(),
            })?;
            pipeline
                .generate_problem(VocabularyRequest {
                    passage: passage.to_string(),
                    variant: variant.clone(),
                    passage_index,
                    extra_context: None,
                })
                .await
        }
    }
}

/// Accept, repair, or reject a problem before it is persisted.
pub fn finalize_problem(problem: Problem) -> Result<Problem, ForgeError> {
    let value = problem.to_value();
    if is_valid(&value) {
        return Ok(problem);
    }

    let repaired = repair_mcq(&value);
    if is_valid(&repaired) {
        warn!(
            "Repaired structurally invalid {} problem (answer {} → {})",
            problem.kind,
            problem.answer,
            repaired["answer"].as_str().unwrap_or_default()
        );
        return serde_json::from_value(repaired).map_err(|e| ForgeError::InvalidProblem {
            reason: format!("repaired problem does not deserialise: {e}"),
        });
    }

    Err(ForgeError::InvalidProblem {
        reason: format!(
            "{} problem failed validation even after repair",
            if problem.kind.is_empty() { "untyped" } else { problem.kind.as_str() }
        ),
    })
}

/// Load a stored document, generate for one of its passages, and finalise.
pub async fn generate_from_document(
    store: &dyn DocumentStore,
    document_id: i64,
    passage_index: usize,
    kind: &ProblemKind,
    pipeline: Option<&VocabularyPipeline>,
) -> Result<GeneratedProblem, ForgeError> {
    let ctx = get_document_context(store, document_id).await?;
    let passage = ctx
        .passages
        .get(passage_index)
        .ok_or(ForgeError::PassageOutOfRange {
            index: passage_index,
            total: ctx.passages.len(),
        })?;

    let mut generated = generate_for_passage(kind, passage, passage_index, pipeline).await?;
    generated.problem = finalize_problem(generated.problem)?;
    info!(
        "Generated {} problem for document {} passage {}",
        generated.problem.kind, document_id, passage_index
    );
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::InMemoryDocumentStore;
    use serde_json::json;

    fn problem(options: Vec<&str>, answer: &str) -> Problem {
        Problem {
            kind: "order".into(),
            question: "q".into(),
            options: Some(options.into_iter().map(String::from).collect()),
            answer: answer.into(),
            explanation: None,
            metadata: Some(json!({"k": 1})),
        }
    }

    #[test]
    fn finalize_passes_valid_problems_through() {
        let p = problem(vec!["a", "b"], "2");
        assert_eq!(finalize_problem(p.clone()).unwrap(), p);
    }

    #[test]
    fn finalize_repairs_answer_zero() {
        let p = problem(vec!["a", "b"], "0");
        let fixed = finalize_problem(p).unwrap();
        assert_eq!(fixed.answer, "1");
        assert_eq!(fixed.metadata, Some(json!({"k": 1})));
    }

    #[test]
    fn finalize_rejects_unrepairable() {
        let p = Problem {
            kind: "order".into(),
            question: "".into(),
            options: None,
            answer: "1".into(),
            explanation: None,
            metadata: None,
        };
        assert!(matches!(
            finalize_problem(p),
            Err(ForgeError::InvalidProblem { .. })
        ));
    }

    #[tokio::test]
    async fn vocabulary_without_pipeline_is_not_configured() {
        let kind = ProblemKind::Vocabulary(VocabularyVariant::inappropriate());
        let err = generate_for_passage(&kind, "Any passage.", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ProviderNotConfigured { .. }));
    }

    #[tokio::test]
    async fn document_passage_out_of_range() {
        let store = InMemoryDocumentStore::new();
        let id = store.insert("t", r#"{"passages": ["One. Two. Three. Four. Five."]}"#);
        let err = generate_from_document(&store, id, 3, &ProblemKind::Insertion, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::PassageOutOfRange { index: 3, total: 1 }));

        let ok = generate_from_document(&store, id, 0, &ProblemKind::Insertion, None)
            .await
            .unwrap();
        assert_eq!(ok.problem.kind, "insertion");
        assert_eq!(ok.meta.attempts, 1);
    }
}
