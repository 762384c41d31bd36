//! Model client seam: the trait the queue calls, and its `edgequake-llm`
//! implementation.
//!
//! The queue never talks to a provider directly. It asks a
//! [`ClientAccessor`] for the current [`ChatClient`] on every attempt, so a
//! client can be configured, swapped or removed while requests are waiting.
//! "No client" is an ordinary retryable [`AttemptError::ClientUnavailable`].

use crate::config::GenerationConfig;
use crate::error::{AttemptError, ForgeError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model to use; `None` lets the client pick its default.
    pub model: Option<String>,
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// The text a model produced, plus accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub content: String,
    pub model: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Anything that can answer a [`ChatRequest`].
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, AttemptError>;
}

/// Evaluated on every attempt; `None` means no client is configured.
pub type ClientAccessor = Arc<dyn Fn() -> Option<Arc<dyn ChatClient>> + Send + Sync>;

/// A swappable holder for the current client.
///
/// The web layer sets it once an API key is known and clears it when the key
/// is revoked; queued tasks see the change on their next attempt.
#[derive(Default)]
pub struct ClientSlot {
    current: RwLock<Option<Arc<dyn ChatClient>>>,
}

impl ClientSlot {
    pub fn new(client: Option<Arc<dyn ChatClient>>) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(client),
        })
    }

    pub fn set(&self, client: Arc<dyn ChatClient>) {
        *self.write() = Some(client);
    }

    pub fn clear(&self) {
        *self.write() = None;
    }

    pub fn get(&self) -> Option<Arc<dyn ChatClient>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Write guard, reclaimed if a writer panicked.
    fn write(&self) -> RwLockWriteGuard<'_, Option<Arc<dyn ChatClient>>> {
        self.current.write().unwrap_or_else(|poisoned| {
            warn!("client slot lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    pub fn is_configured(&self) -> bool {
        self.get().is_some()
    }

    /// An accessor reading this slot.
    pub fn accessor(self: &Arc<Self>) -> ClientAccessor {
        let slot = Arc::clone(self);
        Arc::new(move || slot.get())
    }
}

// ── edgequake-llm backed client ──────────────────────────────────────────

/// [`ChatClient`] over an `edgequake-llm` provider.
///
/// A provider is bound to one model, so requests naming another model get a
/// provider created on first use and cached by model name.
pub struct ProviderChatClient {
    provider_name: String,
    default_model: String,
    default_provider: Arc<dyn LLMProvider>,
    by_model: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl ProviderChatClient {
    pub fn new(
        provider_name: impl Into<String>,
        default_model: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            default_model: default_model.into(),
            default_provider: provider,
            by_model: Mutex::new(HashMap::new()),
        }
    }

    fn provider_for(&self, model: Option<&str>) -> Result<(Arc<dyn LLMProvider>, String), AttemptError> {
        let model = match model {
            Some(m) if m != self.default_model => m,
            _ => return Ok((Arc::clone(&self.default_provider), self.default_model.clone())),
        };
        let name = self.provider_name.as_str();
        let mut cache = self
            .by_model
            .lock()
            .map_err(|_| AttemptError::api("provider cache poisoned"))?;
        if let Some(p) = cache.get(model) {
            return Ok((Arc::clone(p), model.to_string()));
        }
        let provider = ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| AttemptError::api(format!("cannot create {name}/{model}: {e}")))?;
        debug!("created provider {}/{}", name, model);
        cache.insert(model.to_string(), Arc::clone(&provider));
        Ok((provider, model.to_string()))
    }
}

#[async_trait]
impl ChatClient for ProviderChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, AttemptError> {
        let (provider, model) = self.provider_for(request.model.as_deref())?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(&request.user));

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| AttemptError::api(format!("{}", e)))?;

        if response.content.trim().is_empty() {
            return Err(AttemptError::EmptyResponse);
        }

        debug!(
            "{}: {} input tokens, {} output tokens",
            model, response.prompt_tokens, response.completion_tokens
        );

        Ok(ChatReply {
            content: response.content,
            model,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        })
    }
}

/// Resolve a client from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.client`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **OpenAI key** (`OPENAI_API_KEY`) with `config.model`.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// Returns `Err(ProviderNotConfigured)` when nothing is available; callers
/// that want the soft behaviour put the result in a [`ClientSlot`] with
/// `.ok()`.
pub fn resolve_client(config: &GenerationConfig) -> Result<Arc<dyn ChatClient>, ForgeError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    if let Some(ref name) = config.provider_name {
        return named_client(name, &config.model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return named_client(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return named_client("openai", &config.model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ForgeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    let name = llm_provider.name().to_string();
    info!("Using auto-detected LLM provider: {}", name);
    Ok(Arc::new(ProviderChatClient::new(
        name,
        config.model.clone(),
        llm_provider,
    )))
}

/// Build a [`ClientSlot`] from the config, empty when no provider resolves.
pub fn client_slot(config: &GenerationConfig) -> Arc<ClientSlot> {
    match resolve_client(config) {
        Ok(client) => ClientSlot::new(Some(client)),
        Err(e) => {
            warn!("No model client configured; AI generation will fail per task: {}", e);
            ClientSlot::new(None)
        }
    }
}

fn named_client(name: &str, model: &str) -> Result<Arc<dyn ChatClient>, ForgeError> {
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        ForgeError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(ProviderChatClient::new(
        name,
        model,
        provider,
    )))
}
