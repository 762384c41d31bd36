//! Progress-callback trait for per-attempt generation events.
//!
//! Inject an [`Arc<dyn GenerationProgressCallback>`] via
//! [`crate::config::GenerationConfigBuilder::progress_callback`] to observe
//! the vocabulary pipeline as it moves through attempts, repairs and model
//! tiers. Callers forward events wherever they like (a terminal spinner, a
//! websocket, a job table) without the library knowing how.
//!
//! # Example
//!
//! ```rust
//! use examforge::{GenerationConfig, GenerationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct FailureCounter {
//!     failures: AtomicU32,
//! }
//!
//! impl GenerationProgressCallback for FailureCounter {
//!     fn on_attempt_failed(&self, attempt: u32, reason: &str) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("attempt {attempt} failed: {reason}");
//!     }
//! }
//!
//! let counter = Arc::new(FailureCounter { failures: AtomicU32::new(0) });
//! let config = GenerationConfig::builder()
//!     .progress_callback(counter as Arc<dyn GenerationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the vocabulary pipeline as it works through its attempts.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: several
/// pipelines can share one callback while their requests wait in the queue.
pub trait GenerationProgressCallback: Send + Sync {
    /// Called before the model is invoked for an attempt.
    ///
    /// # Arguments
    /// * `attempt`: 1-indexed attempt number
    /// * `max_attempts`: attempt budget
    /// * `model`: model tier selected for this attempt
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32, model: &str) {
        let _ = (attempt, max_attempts, model);
    }

    /// Called when an attempt (including its repair pass, if any) failed.
    fn on_attempt_failed(&self, attempt: u32, reason: &str) {
        let _ = (attempt, reason);
    }

    /// Called when a repair pass starts.
    ///
    /// * `remaining_budget`: repairs left after this one
    fn on_repair(&self, attempt: u32, remaining_budget: u32) {
        let _ = (attempt, remaining_budget);
    }

    /// Called once when a normalised problem is produced.
    fn on_complete(&self, attempts: u32) {
        let _ = attempts;
    }

    /// Called once when every attempt failed.
    fn on_exhausted(&self, attempts: u32, last_reason: &str) {
        let _ = (attempts, last_reason);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GenerationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::GenerationConfig`].
pub type ProgressCallback = Arc<dyn GenerationProgressCallback>;
