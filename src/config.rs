//! Configuration types for extraction and generation.
//!
//! Generation behaviour is controlled through [`GenerationConfig`], built via
//! [`GenerationConfigBuilder`]; extraction through [`ExtractionConfig`].
//! Callers set only what they care about and rely on the documented defaults
//! for the rest.

use crate::error::ForgeError;
use crate::llm::ChatClient;
use crate::progress::ProgressCallback;
use crate::queue::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for AI-backed problem generation.
///
/// # Example
/// ```rust
/// use examforge::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .model("gpt-4o-mini")
///     .premium_model("gpt-4o")
///     .max_attempts(6)
///     .build()
///     .unwrap();
/// assert_eq!(config.repair_budget, 2);
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// Model used for the first attempts. Default: `gpt-4o-mini`.
    pub model: String,

    /// Higher-capability model switched in from `premium_from_attempt`.
    /// Default: `gpt-4o`.
    pub premium_model: String,

    /// Sampling temperature for the base model. Default: 0.7.
    ///
    /// Vocabulary items need some variety in which word gets swapped; lower
    /// values make every attempt pick the same span.
    pub temperature: f32,

    /// Sampling temperature once the premium model is in use. Default: 0.3.
    pub premium_temperature: f32,

    /// Maximum tokens per model reply. Default: 2048.
    pub max_tokens: usize,

    /// Retry/backoff policy applied by the queue to every model call.
    /// Default: 3 retries, 500 ms base, 4000 ms cap.
    pub retry: RetryPolicy,

    /// Outer attempts of the vocabulary pipeline. Default: 6.
    pub max_attempts: u32,

    /// Repair passes available across all attempts. Default: 2.
    pub repair_budget: u32,

    /// First attempt (1-indexed) that uses the premium model. Default: 3.
    pub premium_from_attempt: u32,

    /// Provider name (`openai`, `anthropic`, `gemini`, `ollama`, ...).
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed client. Takes precedence over `provider_name`.
    pub client: Option<Arc<dyn ChatClient>>,

    /// Optional per-attempt progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            premium_model: "gpt-4o".to_string(),
            temperature: 0.7,
            premium_temperature: 0.3,
            max_tokens: 2048,
            retry: RetryPolicy::default(),
            max_attempts: 6,
            repair_budget: 2,
            premium_from_attempt: 3,
            provider_name: None,
            client: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("model", &self.model)
            .field("premium_model", &self.premium_model)
            .field("temperature", &self.temperature)
            .field("premium_temperature", &self.premium_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("max_attempts", &self.max_attempts)
            .field("repair_budget", &self.repair_budget)
            .field("premium_from_attempt", &self.premium_from_attempt)
            .field("provider_name", &self.provider_name)
            .field("client", &self.client.as_ref().map(|_| "<dyn ChatClient>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model and temperature for the given 1-indexed attempt.
    pub fn tier_for_attempt(&self, attempt: u32) -> (&str, f32) {
        if attempt >= self.premium_from_attempt {
            (&self.premium_model, self.premium_temperature)
        } else {
            (&self.model, self.temperature)
        }
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn premium_model(mut self, model: impl Into<String>) -> Self {
        self.config.premium_model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn premium_temperature(mut self, t: f32) -> Self {
        self.config.premium_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.config.retry.retries = n;
        self
    }

    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay = Duration::from_millis(ms);
        self
    }

    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.max_delay = Duration::from_millis(ms);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn repair_budget(mut self, n: u32) -> Self {
        self.config.repair_budget = n;
        self
    }

    pub fn premium_from_attempt(mut self, n: u32) -> Self {
        self.config.premium_from_attempt = n.max(1);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, ForgeError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(ForgeError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() || c.premium_model.trim().is_empty() {
            return Err(ForgeError::InvalidConfig("model names must not be empty".into()));
        }
        if c.retry.base_delay > c.retry.max_delay {
            return Err(ForgeError::InvalidConfig(format!(
                "base delay {:?} exceeds max delay {:?}",
                c.retry.base_delay, c.retry.max_delay
            )));
        }
        Ok(self.config)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Which parser to run over a text dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ExtractionLayout {
    /// Structured first; fall back to mini when it yields no passages. (default)
    #[default]
    Auto,
    /// Block-numbered layout (`NN. pNN-...` opens every passage).
    Structured,
    /// Page-keyed layout with several passages per page.
    Mini,
}

/// Configuration for passage extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub layout: ExtractionLayout,
    /// PDF user password for encrypted documents.
    pub password: Option<String>,
    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            layout: ExtractionLayout::default(),
            password: None,
            download_timeout_secs: 120,
        }
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn layout(mut self, layout: ExtractionLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn build(self) -> ExtractionConfig {
        self.config
    }
}
