//! HTTP adapters for the four panel providers.
//!
//! Each adapter owns one `reqwest::Client` with the configured timeout and
//! maps provider failures onto [`DispatchError`]:
//!
//! - HTTP 429 → `RateLimited`
//! - other non-success status, connect errors → `Unreachable`
//! - client timeout → `Timeout`
//! - missing text in the payload → `InvalidResponse`

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{BackendId, ChatMessage, CompletionBackend, DispatchError, Role};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-20241022";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

/// Connection settings for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderSettings {
    /// Defaults for `backend` with the given key.
    pub fn for_backend(backend: BackendId, api_key: impl Into<String>) -> Self {
        let (model, base_url) = match backend {
            BackendId::OpenAi => (DEFAULT_OPENAI_MODEL, OPENAI_BASE_URL),
            BackendId::DeepSeek => (DEFAULT_DEEPSEEK_MODEL, DEEPSEEK_BASE_URL),
            BackendId::Anthropic => (DEFAULT_ANTHROPIC_MODEL, ANTHROPIC_BASE_URL),
            BackendId::Gemini => (DEFAULT_GEMINI_MODEL, GEMINI_BASE_URL),
        };
        Self {
            api_key: api_key.into(),
            model: model.to_string(),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build the concrete adapter for `backend`.
pub fn build_backend(
    backend: BackendId,
    settings: ProviderSettings,
) -> Result<Arc<dyn CompletionBackend>, reqwest::Error> {
    let adapter: Arc<dyn CompletionBackend> = match backend {
        BackendId::OpenAi | BackendId::DeepSeek => {
            Arc::new(OpenAiCompatible::new(backend, settings)?)
        }
        BackendId::Anthropic => Arc::new(AnthropicBackend::new(settings)?),
        BackendId::Gemini => Arc::new(GeminiBackend::new(settings)?),
    };
    Ok(adapter)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

fn send_error(backend: BackendId, timeout: Duration, e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout {
            backend,
            after: timeout,
        }
    } else {
        DispatchError::unreachable(backend, e.to_string())
    }
}

/// Turn a response into JSON, classifying non-success statuses.
async fn read_json(
    backend: BackendId,
    timeout: Duration,
    response: reqwest::Response,
) -> Result<Value, DispatchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status, truncate(&body, 500));
        return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            DispatchError::RateLimited { backend, message }
        } else {
            DispatchError::Unreachable { backend, message }
        });
    }
    response.json::<Value>().await.map_err(|e| {
        if e.is_timeout() {
            DispatchError::Timeout {
                backend,
                after: timeout,
            }
        } else {
            DispatchError::invalid_response(backend, e.to_string())
        }
    })
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn text_at(backend: BackendId, value: Option<&Value>, what: &str) -> Result<String, DispatchError> {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DispatchError::invalid_response(backend, format!("missing {what}")))
}

// ── OpenAI / DeepSeek ────────────────────────────────────────────────────────

/// OpenAI chat-completions API; DeepSeek speaks the same protocol.
pub struct OpenAiCompatible {
    backend: BackendId,
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl OpenAiCompatible {
    pub fn new(backend: BackendId, settings: ProviderSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            backend,
            client: http_client(settings.timeout)?,
            settings,
        })
    }
}

pub(crate) fn openai_body(model: &str, messages: &[ChatMessage]) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();
    json!({ "model": model, "messages": messages })
}

#[async_trait]
impl CompletionBackend for OpenAiCompatible {
    fn id(&self) -> BackendId {
        self.backend
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DispatchError> {
        let start = Instant::now();
        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&openai_body(&self.settings.model, messages))
            .send()
            .await
            .map_err(|e| send_error(self.backend, self.settings.timeout, e))?;

        let body = read_json(self.backend, self.settings.timeout, response).await?;
        let text = text_at(
            self.backend,
            body.pointer("/choices/0/message/content"),
            "choices[0].message.content",
        )?;

        debug!(
            backend = %self.backend,
            model = %self.settings.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(text)
    }
}

// ── Anthropic ───────────────────────────────────────────────────────────────

/// Anthropic messages API.
pub struct AnthropicBackend {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(settings: ProviderSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(settings.timeout)?,
            settings,
        })
    }
}

/// A leading system message becomes the top-level `system` field.
pub(crate) fn anthropic_body(model: &str, messages: &[ChatMessage]) -> Value {
    let (system, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (first.content.as_str(), rest),
        _ => ("", messages),
    };
    let rest: Vec<Value> = rest
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect();
    json!({
        "model": model,
        "max_tokens": ANTHROPIC_MAX_TOKENS,
        "system": system,
        "messages": rest,
    })
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn id(&self) -> BackendId {
        BackendId::Anthropic
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DispatchError> {
        let start = Instant::now();
        let url = format!("{}/messages", self.settings.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&anthropic_body(&self.settings.model, messages))
            .send()
            .await
            .map_err(|e| send_error(BackendId::Anthropic, self.settings.timeout, e))?;

        let body = read_json(BackendId::Anthropic, self.settings.timeout, response).await?;
        let text = text_at(
            BackendId::Anthropic,
            body.pointer("/content/0/text"),
            "content[0].text",
        )?;

        debug!(
            backend = "anthropic",
            model = %self.settings.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(text)
    }
}

// ── Gemini ──────────────────────────────────────────────────────────────────

/// Google Gemini `generateContent` API.
pub struct GeminiBackend {
    settings: ProviderSettings,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(settings: ProviderSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: http_client(settings.timeout)?,
            settings,
        })
    }
}

/// Gemini has no system role here: the system text is folded into the final
/// user prompt, and `assistant` turns are sent as `model`.
pub(crate) fn gemini_body(messages: &[ChatMessage]) -> Value {
    let mut system = String::new();
    let mut turns: Vec<(&'static str, String)> = Vec::new();
    for m in messages {
        match m.role {
            Role::System => system = m.content.clone(),
            Role::User => turns.push(("user", m.content.clone())),
            Role::Assistant => turns.push(("model", m.content.clone())),
        }
    }

    let ends_with_user = matches!(turns.last(), Some((role, _)) if *role == "user");
    let last_prompt = if ends_with_user {
        turns.pop().map(|(_, text)| text).unwrap_or_default()
    } else {
        String::new()
    };
    let prompt = if system.is_empty() {
        last_prompt
    } else {
        format!("{system}\n\n---\n\n{last_prompt}")
    };

    let mut contents: Vec<Value> = turns
        .into_iter()
        .map(|(role, text)| json!({"role": role, "parts": [{"text": text}]}))
        .collect();
    contents.push(json!({"role": "user", "parts": [{"text": prompt}]}));

    json!({ "contents": contents })
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    fn id(&self) -> BackendId {
        BackendId::Gemini
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, DispatchError> {
        let start = Instant::now();
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&gemini_body(messages))
            .send()
            .await
            .map_err(|e| send_error(BackendId::Gemini, self.settings.timeout, e))?;

        let body = read_json(BackendId::Gemini, self.settings.timeout, response).await?;
        let text = text_at(
            BackendId::Gemini,
            body.pointer("/candidates/0/content/parts/0/text"),
            "candidates[0].content.parts[0].text",
        )?;

        debug!(
            backend = "gemini",
            model = %self.settings.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(text)
    }
}
