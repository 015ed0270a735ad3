//! Model Dispatch Facade
//!
//! One call signature, `complete(backend, messages) -> text`, over
//! heterogeneous LLM providers. Backends are a closed enum; the
//! [`BackendRegistry`] is the explicit table mapping each id to the adapter
//! that serves it. Unknown names are rejected at parse time and never
//! redirected to a default provider.

pub mod errors;
pub mod providers;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use errors::{DispatchError, FailureKind};

/// LLM backends the panel can seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
}

/// Accepted spellings, including the model names offered in the admin UI.
const ALIASES: &[(&str, BackendId)] = &[
    ("openai", BackendId::OpenAi),
    ("gpt-4o-mini", BackendId::OpenAi),
    ("gpt-4o", BackendId::OpenAi),
    ("anthropic", BackendId::Anthropic),
    ("claude", BackendId::Anthropic),
    ("claude-3-5-haiku", BackendId::Anthropic),
    ("claude-3-sonnet-20240229", BackendId::Anthropic),
    ("gemini", BackendId::Gemini),
    ("gemini-1.5-flash", BackendId::Gemini),
    ("gemini-1.5-flash-latest", BackendId::Gemini),
    ("deepseek", BackendId::DeepSeek),
    ("deepseek-chat", BackendId::DeepSeek),
];

impl BackendId {
    pub const ALL: [BackendId; 4] = [Self::OpenAi, Self::Anthropic, Self::Gemini, Self::DeepSeek];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend name that is not in the alias table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown backend id '{0}' (expected one of: openai, anthropic, gemini, deepseek)")]
pub struct UnknownBackendId(pub String);

impl FromStr for BackendId {
    type Err = UnknownBackendId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == needle)
            .map(|(_, id)| *id)
            .ok_or_else(|| UnknownBackendId(s.to_string()))
    }
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The capability the core consumes: send messages to a backend, get text.
#[async_trait]
pub trait ModelDispatch: Send + Sync {
    async fn complete(
        &self,
        backend: BackendId,
        messages: &[ChatMessage],
    ) -> Result<String, DispatchError>;
}

/// A single provider adapter.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn id(&self) -> BackendId;

    /// Model name sent to the provider.
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DispatchError>;
}

/// Retry budget for one `complete` call through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt + 1`: `base * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Explicit registration table of backend adapters.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendId, Arc<dyn CompletionBackend>>,
    retry: RetryPolicy,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register an adapter under its own id, replacing any previous one.
    pub fn register(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        debug!(backend = %backend.id(), model = backend.model(), "backend registered");
        self.backends.insert(backend.id(), backend);
        self
    }

    pub fn is_registered(&self, id: BackendId) -> bool {
        self.backends.contains_key(&id)
    }

    /// Registered ids in enum order.
    pub fn registered(&self) -> Vec<BackendId> {
        BackendId::ALL
            .into_iter()
            .filter(|id| self.is_registered(*id))
            .collect()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.registered())
            .field("retry", &self.retry)
            .finish()
    }
}

#[async_trait]
impl ModelDispatch for BackendRegistry {
    async fn complete(
        &self,
        backend: BackendId,
        messages: &[ChatMessage],
    ) -> Result<String, DispatchError> {
        let adapter = self
            .backends
            .get(&backend)
            .ok_or(DispatchError::NotConfigured(backend))?;

        let mut attempt = 0;
        loop {
            match adapter.complete(messages).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retriable() && attempt < self.retry.max_retries => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        backend = %backend,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient backend error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
