//! AI-backed vocabulary-usage problems.
//!
//! ```text
//! attempt n ─▶ prompt(tag, failures) ─▶ queue ─▶ parse JSON ─▶ normalise ─▶ done
//!                    ▲                                 │ fail
//!                    │                                 ▼
//!                    └──── FailureLog ◀── repair pass (budget permitting)
//! ```
//!
//! Attempts from `premium_from_attempt` on use the premium model at its
//! lower temperature. Each failure reason is recorded in a [`FailureLog`]
//! and echoed into later prompts so the model does not repeat the mistake.

use super::normalize::{PayloadNormalizer, VocabularyNormalizer};
use crate::config::GenerationConfig;
use crate::error::{AttemptError, ForgeError};
use crate::llm::ChatRequest;
use crate::output::{unix_millis, GeneratedProblem, GenerationMeta};
use crate::pipeline::cleanup::parse_model_json;
use crate::problem::Problem;
use crate::prompts;
use crate::queue::{GenerationQueue, RetryPolicy};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GENERATOR_NAME: &str = "vocabulary-pipeline";

/// Whether students look for the misused word or the correctly used one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyTarget {
    Incorrect,
    Correct,
}

/// Item flavour. The targeted side always has exactly one span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyVariant {
    pub id: String,
    pub label: String,
    pub question: String,
    pub target: VocabularyTarget,
    pub correct_count: u8,
    pub incorrect_count: u8,
}

impl VocabularyVariant {
    /// Four correct spans, one misused; the answer is the misused one.
    pub fn inappropriate() -> Self {
        Self {
            id: "inappropriate".into(),
            label: "어휘 (적절하지 않은 것)".into(),
            question: "다음 글의 밑줄 친 부분 중, 문맥상 낱말의 쓰임이 적절하지 않은 것은?".into(),
            target: VocabularyTarget::Incorrect,
            correct_count: 4,
            incorrect_count: 1,
        }
    }

    /// One correct span, four misused; the answer is the correct one.
    pub fn appropriate() -> Self {
        Self {
            id: "appropriate".into(),
            label: "어휘 (적절한 것)".into(),
            question: "다음 글의 밑줄 친 부분 중, 문맥상 낱말의 쓰임이 적절한 것은?".into(),
            target: VocabularyTarget::Correct,
            correct_count: 1,
            incorrect_count: 4,
        }
    }

    pub fn by_id(id: &str) -> Option<Self> {
        match id {
            "inappropriate" => Some(Self::inappropriate()),
            "appropriate" => Some(Self::appropriate()),
            _ => None,
        }
    }
}

/// Input to [`VocabularyPipeline::generate_problem`].
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyRequest {
    pub passage: String,
    pub variant: VocabularyVariant,
    /// 0-based position of the passage in its document.
    pub passage_index: usize,
    pub extra_context: Option<String>,
}

/// Failure reasons collected across attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureLog {
    entries: Vec<(u32, String)>,
}

impl FailureLog {
    pub fn record(&mut self, attempt: u32, reason: impl Into<String>) {
        self.entries.push((attempt, reason.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn last_reason(&self) -> Option<&str> {
        self.entries.last().map(|(_, r)| r.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(a, r)| (*a, r.as_str()))
    }

    /// Distinct reasons, oldest first, as prompt directives.
    pub fn directives(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, reason) in &self.entries {
            if !out.contains(reason) {
                out.push(reason.clone());
            }
        }
        out
    }
}

/// Second chance for a payload the normaliser rejected.
///
/// Receives the raw reply and the rejection reason; returns replacement raw
/// text, which the pipeline parses and normalises again.
#[async_trait]
pub trait PayloadRepairer: Send + Sync {
    async fn repair(
        &self,
        raw: &str,
        reason: &str,
        variant: &VocabularyVariant,
        model: &str,
    ) -> Result<String, AttemptError>;
}

/// Default repairer: asks the model to fix its own payload, through the queue.
pub struct QueueRepairer {
    queue: GenerationQueue,
    temperature: f32,
    max_tokens: usize,
    retry: RetryPolicy,
}

impl QueueRepairer {
    pub fn new(queue: GenerationQueue, config: &GenerationConfig) -> Self {
        Self {
            queue,
            temperature: config.premium_temperature,
            max_tokens: config.max_tokens,
            retry: config.retry,
        }
    }
}

#[async_trait]
impl PayloadRepairer for QueueRepairer {
    async fn repair(
        &self,
        raw: &str,
        reason: &str,
        variant: &VocabularyVariant,
        model: &str,
    ) -> Result<String, AttemptError> {
        let request = ChatRequest {
            model: Some(model.to_string()),
            system: Some(prompts::REPAIR_SYSTEM_PROMPT.to_string()),
            user: prompts::build_repair_prompt(raw, reason, variant),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let reply = self.queue.call_chat_completion(request, Some(self.retry)).await?;
        Ok(reply.content)
    }
}

/// Reply text and the model that actually served it.
struct Reply {
    content: String,
    model: String,
}

/// An attempt's failure and the rejected reply, when there was one.
struct Failed {
    error: AttemptError,
    rejected: Option<Reply>,
}

impl Failed {
    fn without_reply(error: AttemptError) -> Self {
        Self {
            error,
            rejected: None,
        }
    }
}

/// Drives vocabulary generation through the queue.
pub struct VocabularyPipeline {
    queue: GenerationQueue,
    config: GenerationConfig,
    normalizer: Arc<dyn PayloadNormalizer>,
    repairer: Arc<dyn PayloadRepairer>,
}

impl VocabularyPipeline {
    pub fn new(queue: GenerationQueue, config: GenerationConfig) -> Self {
        let repairer = Arc::new(QueueRepairer::new(queue.clone(), &config));
        Self {
            queue,
            config,
            normalizer: Arc::new(VocabularyNormalizer),
            repairer,
        }
    }

    pub fn with_normalizer(mut self, normalizer: impl PayloadNormalizer + 'static) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    pub fn with_repairer(mut self, repairer: impl PayloadRepairer + 'static) -> Self {
        self.repairer = Arc::new(repairer);
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate one problem, or fail with the last reason once every
    /// attempt is used up.
    pub async fn generate_problem(
        &self,
        request: VocabularyRequest,
    ) -> Result<GeneratedProblem, ForgeError> {
        let max_attempts = self.config.max_attempts;
        let callback = self.config.progress_callback.as_ref();
        let mut failures = FailureLog::default();
        let mut repairs_left = self.config.repair_budget;

        for attempt in 1..=max_attempts {
            let (model, temperature) = self.config.tier_for_attempt(attempt);
            let model = model.to_string();
            if let Some(cb) = callback {
                cb.on_attempt_start(attempt, max_attempts, &model);
            }

            let tag = variant_tag(request.passage_index);
            let prompt =
                prompts::build_vocabulary_prompt(&request, &tag, &failures.directives());
            debug!("attempt {} [{}] on {} (t={})", attempt, tag, model, temperature);

            let mut outcome = self
                .attempt(&prompt, &model, temperature, &request.variant)
                .await;

            if let Err(Failed {
                error,
                rejected: Some(rejected),
            }) = &outcome
            {
                if repairs_left > 0 {
                    repairs_left -= 1;
                    warn!(
                        "Attempt {} rejected ({}); repairing, {} repair(s) left",
                        attempt, error, repairs_left
                    );
                    if let Some(cb) = callback {
                        cb.on_repair(attempt, repairs_left);
                    }
                    let reason = error.to_string();
                    let rejected = Reply {
                        content: rejected.content.clone(),
                        model: rejected.model.clone(),
                    };
                    outcome = self
                        .repair(rejected, &reason, &model, &request.variant)
                        .await;
                }
            }

            match outcome {
                Ok((mut problem, served_model)) => {
                    if served_model != model {
                        debug!("requested {} but {} served the reply", model, served_model);
                    }
                    let meta = GenerationMeta {
                        generator: GENERATOR_NAME.to_string(),
                        model: served_model,
                        attempts: attempt,
                    };
                    problem.set_metadata(
                        "generation",
                        json!({
                            "generator": meta.generator,
                            "model": meta.model,
                            "attempts": meta.attempts,
                            "variantTag": tag,
                        }),
                    );
                    info!(
                        "Vocabulary problem for passage {} ready after {} attempt(s) on {}",
                        request.passage_index, attempt, meta.model
                    );
                    if let Some(cb) = callback {
                        cb.on_complete(attempt);
                    }
                    return Ok(GeneratedProblem { problem, meta });
                }
                Err(failed) => {
                    let reason = failed.error.to_string();
                    warn!("Attempt {}/{} failed: {}", attempt, max_attempts, reason);
                    if let Some(cb) = callback {
                        cb.on_attempt_failed(attempt, &reason);
                    }
                    failures.record(attempt, reason);
                }
            }
        }

        let last_reason = failures
            .last_reason()
            .unwrap_or("no attempts were made")
            .to_string();
        if let Some(cb) = callback {
            cb.on_exhausted(max_attempts, &last_reason);
        }
        Err(ForgeError::GenerationExhausted {
            attempts: max_attempts,
            last_reason,
        })
    }

    async fn attempt(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        variant: &VocabularyVariant,
    ) -> Result<(Problem, String), Failed> {
        let request = ChatRequest {
            model: Some(model.to_string()),
            system: Some(prompts::VOCABULARY_SYSTEM_PROMPT.to_string()),
            user: prompt.to_string(),
            temperature,
            max_tokens: self.config.max_tokens,
        };
        let reply = self
            .queue
            .call_chat_completion(request, Some(self.config.retry))
            .await
            .map_err(Failed::without_reply)?;
        self.interpret(
            Reply {
                content: reply.content,
                model: reply.model,
            },
            variant,
        )
    }

    async fn repair(
        &self,
        rejected: Reply,
        reason: &str,
        model: &str,
        variant: &VocabularyVariant,
    ) -> Result<(Problem, String), Failed> {
        let repaired = self
            .repairer
            .repair(&rejected.content, reason, variant, model)
            .await
            .map_err(Failed::without_reply)?;
        // Credit the model whose reply was repaired.
        self.interpret(
            Reply {
                content: repaired,
                model: rejected.model,
            },
            variant,
        )
    }

    /// Parse and normalise a reply, keeping the serving model on success.
    fn interpret(
        &self,
        reply: Reply,
        variant: &VocabularyVariant,
    ) -> Result<(Problem, String), Failed> {
        let payload: Value = match parse_model_json(&reply.content) {
            Ok(v) => v,
            Err(detail) => {
                return Err(Failed {
                    error: AttemptError::Parse { detail },
                    rejected: Some(reply),
                })
            }
        };
        match self.normalizer.normalize(&payload, variant) {
            Ok(problem) => Ok((problem, reply.model)),
            Err(error) => Err(Failed {
                error,
                rejected: Some(reply),
            }),
        }
    }
}

/// `vocab-<unix ms>-<passage index>-<8 hex>`
pub fn variant_tag(passage_index: usize) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("vocab-{}-{}-{:08x}", unix_millis(), passage_index, suffix)
}
