//! # examforge
//!
//! Turn Korean high-school English exam material into practice problems.
//!
//! Exam PDFs and their text dumps mix Korean translations, source markers,
//! summary arrows and English passages across columns. This crate recovers
//! the English passages, then builds multiple-choice problems from them:
//! sentence order and sentence insertion by rule, vocabulary usage through a
//! chat model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / .txt / URL
//!  │
//!  ├─ 1. Input      resolve local file or download, sniff %PDF vs UTF-8
//!  ├─ 2. Text       pdfium text layer (spawn_blocking), pages joined by \f
//!  ├─ 3. Parse      structured or mini layout → ExtractionResult
//!  ├─ 4. Store      DocumentStore rows → DocumentContext passages
//!  ├─ 5. Generate   order / insertion (rule-based) or vocabulary (model)
//!  │                   └─ GenerationQueue: one model call at a time, backoff
//!  └─ 6. Finalise   validate → repair → validate before persisting
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use examforge::{extract, generate_order_problem, Difficulty, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let result = extract("midterm.pdf", &ExtractionConfig::default()).await?;
//!     println!("{}: {} passages", result.title, result.passages.len());
//!
//!     let problem = generate_order_problem(&result.passages[0].passage, Difficulty::Basic)?;
//!     println!("{}", serde_json::to_string_pretty(&problem)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Vocabulary problems
//!
//! ```rust,no_run
//! use examforge::{
//!     client_slot, GenerationConfig, GenerationQueue, VocabularyPipeline, VocabularyRequest,
//!     VocabularyVariant,
//! };
//!
//! # async fn run(passage: String) -> Result<(), Box<dyn std::error::Error>> {
//! let config = GenerationConfig::default();
//! // Empty when no API key is set; tasks then fail per attempt, not at startup.
//! let slot = client_slot(&config);
//! let queue = GenerationQueue::new(slot.accessor(), config.retry);
//! let pipeline = VocabularyPipeline::new(queue, config);
//!
//! let generated = pipeline
//!     .generate_problem(VocabularyRequest {
//!         passage,
//!         variant: VocabularyVariant::inappropriate(),
//!         passage_index: 0,
//!         extra_context: None,
//!     })
//!     .await?;
//! println!("answer {} after {} attempts", generated.problem.answer, generated.meta.attempts);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `examforge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! examforge = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod generate;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod problem;
pub mod progress;
pub mod prompts;
pub mod queue;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, ExtractionLayout, GenerationConfig,
    GenerationConfigBuilder,
};
pub use document::{
    get_document_context, DocumentContext, DocumentRow, DocumentStore, InMemoryDocumentStore,
};
pub use error::{AttemptError, ForgeError};
pub use extract::{extract, extract_from_bytes, extract_sync, extract_to_file, parse_text};
pub use generate::{
    finalize_problem, generate_for_passage, generate_from_document, generate_insertion_problem,
    generate_order_problem, Difficulty, FailureLog, PayloadNormalizer, PayloadRepairer,
    ProblemKind, VocabularyNormalizer, VocabularyPipeline, VocabularyRequest, VocabularyTarget,
    VocabularyVariant,
};
pub use llm::{
    client_slot, resolve_client, ChatClient, ChatReply, ChatRequest, ClientAccessor, ClientSlot,
    ProviderChatClient,
};
pub use output::{
    ExtractionMetadata, ExtractionResult, GeneratedProblem, GenerationMeta, ParserKind, Passage,
};
pub use pipeline::mini::MiniPdfParser;
pub use pipeline::structured::StructuredPdfParser;
pub use problem::{is_valid, repair_mcq, Problem};
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use queue::{run_with_retry, GenerationQueue, RetryPolicy};
