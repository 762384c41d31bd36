//! Error types for the examforge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ForgeError`] is **fatal** for one request. The input cannot be read,
//!   the document does not exist, the text is too short for the requested
//!   generator, or the vocabulary pipeline ran out of attempts. Returned as
//!   `Err(ForgeError)` from the top-level extraction and generation functions.
//!
//! * [`AttemptError`] is **non-fatal**. A single model call or payload check
//!   failed (no client configured, transient API error, malformed JSON). The
//!   retry queue and the vocabulary pipeline absorb these and only surface
//!   them once their budgets are spent.
//!
//! Extraction noise (short fragments, unclassifiable lines) is never an
//! error; the parsers drop it silently.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the examforge library.
#[derive(Debug, Error)]
pub enum ForgeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file is neither a PDF nor UTF-8 text.
    #[error("Unsupported input format for '{path}': {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error("Failed to bind to pdfium library: {0}\nSet PDFIUM_LIB_PATH or place libpdfium next to the binary.")]
    PdfiumBindingFailed(String),

    // ── Document store ────────────────────────────────────────────────────
    #[error("Document not found: {id}")]
    DocumentNotFound { id: i64 },

    /// The requested passage index is past the end of the document.
    #[error("Passage {index} is out of range (document has {total} passages)")]
    PassageOutOfRange { index: usize, total: usize },

    // ── Generation errors ─────────────────────────────────────────────────
    /// A rule-based generator was given too few sentences to build a problem.
    #[error("Text has {found} sentences; at least {required} are required")]
    InsufficientSentences { required: usize, found: usize },

    /// The vocabulary pipeline used every attempt without a valid payload.
    #[error("Vocabulary generation failed after {attempts} attempts: {last_reason}")]
    GenerationExhausted { attempts: u32, last_reason: String },

    /// A generated problem stayed structurally invalid even after repair.
    #[error("Problem is structurally invalid: {reason}")]
    InvalidProblem { reason: String },

    /// The model provider could not be set up (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single model attempt.
///
/// Cloneable so the pipeline can keep the last one for diagnostics while
/// still handing it to progress callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum AttemptError {
    /// The client accessor returned nothing (no API key configured).
    #[error("no model client is configured")]
    ClientUnavailable,

    /// The provider returned an error.
    #[error("model call failed: {message}")]
    Api { message: String },

    /// The provider answered with no text.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The reply could not be parsed as JSON.
    #[error("response is not valid JSON: {detail}")]
    Parse { detail: String },

    /// The parsed payload was rejected by the normaliser.
    #[error("payload rejected: {detail}")]
    Normalize { detail: String },

    /// The queue worker went away before the task settled.
    #[error("generation queue closed before the task completed")]
    QueueClosed,
}

impl AttemptError {
    pub fn api(message: impl Into<String>) -> Self {
        AttemptError::Api {
            message: message.into(),
        }
    }
}
