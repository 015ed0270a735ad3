use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use coordination::debate::{PanelConfig, PromptTemplates};
use coordination::dispatch::providers::{build_backend, ProviderSettings};
use coordination::dispatch::{BackendId, BackendRegistry, RetryPolicy};
use coordination::router::RouterConfig;
use serde::Deserialize;
use tracing::{info, warn};

/// Top-level helper configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Provider API keys; a backend without a key is left unregistered.
    pub api_keys: BTreeMap<BackendId, String>,
    /// Per-provider model name overrides.
    pub models: BTreeMap<BackendId, String>,
    /// Directory of persona YAML files.
    pub prompts_dir: PathBuf,
    /// Per-call deadline for panel and chat calls.
    pub call_timeout: Duration,
    /// Retries for transient backend errors.
    pub max_retries: u32,
    /// Concurrent panel calls (None = panel size).
    pub max_parallel_calls: Option<usize>,
    /// Backend used when a command takes a single one.
    pub default_backend: BackendId,
    pub templates: PromptTemplates,
    pub router: RouterConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyed: Vec<BackendId> = self.api_keys.keys().copied().collect();
        f.debug_struct("AppConfig")
            .field("api_keys", &keyed)
            .field("models", &self.models)
            .field("prompts_dir", &self.prompts_dir)
            .field("call_timeout", &self.call_timeout)
            .field("max_retries", &self.max_retries)
            .field("max_parallel_calls", &self.max_parallel_calls)
            .field("default_backend", &self.default_backend)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }
}

/// Optional TOML overlay (`--config PATH`). Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub prompts_dir: Option<PathBuf>,
    pub call_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub max_parallel_calls: Option<usize>,
    pub default_backend: Option<BackendId>,
    pub models: BTreeMap<BackendId, String>,
    pub templates: Option<PromptTemplates>,
    pub router: Option<RouterConfig>,
}

fn key_var(backend: BackendId) -> &'static str {
    match backend {
        BackendId::OpenAi => "OPENAI_API_KEY",
        BackendId::Anthropic => "ANTHROPIC_API_KEY",
        BackendId::Gemini => "GOOGLE_API_KEY",
        BackendId::DeepSeek => "DEEPSEEK_API_KEY",
    }
}

fn model_var(backend: BackendId) -> &'static str {
    match backend {
        BackendId::OpenAi => "HELPER_OPENAI_MODEL",
        BackendId::Anthropic => "HELPER_ANTHROPIC_MODEL",
        BackendId::Gemini => "HELPER_GEMINI_MODEL",
        BackendId::DeepSeek => "HELPER_DEEPSEEK_MODEL",
    }
}

impl AppConfig {
    /// Build from an environment lookup. Blank values count as unset.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let mut api_keys = BTreeMap::new();
        let mut models = BTreeMap::new();
        for backend in BackendId::ALL {
            if let Some(key) = var(key_var(backend)) {
                api_keys.insert(backend, key);
            }
            if let Some(model) = var(model_var(backend)) {
                models.insert(backend, model);
            }
        }

        Self {
            api_keys,
            models,
            prompts_dir: var("HELPER_PROMPTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("prompts")),
            call_timeout: Duration::from_secs(
                var("HELPER_CALL_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: var("HELPER_MAX_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            max_parallel_calls: None,
            default_backend: BackendId::OpenAi,
            templates: PromptTemplates::default(),
            router: RouterConfig::default(),
        }
    }

    /// Environment defaults, overlaid with the TOML file at `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let file: FileConfig = toml::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            config.apply(file);
        }
        Ok(config)
    }

    /// Overlay file values onto this config.
    pub fn apply(&mut self, file: FileConfig) {
        if let Some(dir) = file.prompts_dir {
            self.prompts_dir = dir;
        }
        if let Some(secs) = file.call_timeout_secs {
            self.call_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.max_retries {
            self.max_retries = n;
        }
        if file.max_parallel_calls.is_some() {
            self.max_parallel_calls = file.max_parallel_calls;
        }
        if let Some(backend) = file.default_backend {
            self.default_backend = backend;
        }
        self.models.extend(file.models);
        if let Some(templates) = file.templates {
            self.templates = templates;
        }
        if let Some(router) = file.router {
            self.router = router;
        }
    }

    pub fn panel_config(&self) -> PanelConfig {
        PanelConfig {
            call_timeout: self.call_timeout,
            max_parallel_calls: self.max_parallel_calls,
        }
    }

    pub fn provider_settings(&self, backend: BackendId) -> Option<ProviderSettings> {
        let key = self.api_keys.get(&backend)?;
        let mut settings =
            ProviderSettings::for_backend(backend, key.clone()).with_timeout(self.call_timeout);
        if let Some(model) = self.models.get(&backend) {
            settings = settings.with_model(model.clone());
        }
        Some(settings)
    }

    /// Register an HTTP adapter for every backend that has an API key.
    pub fn build_registry(&self) -> Result<BackendRegistry> {
        let mut registry = BackendRegistry::new().with_retry(RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        });

        for backend in BackendId::ALL {
            match self.provider_settings(backend) {
                Some(settings) => {
                    let adapter = build_backend(backend, settings)
                        .with_context(|| format!("Failed to build HTTP client for {backend}"))?;
                    registry = registry.register(adapter);
                }
                None => {
                    warn!(backend = %backend, env = key_var(backend), "API key not set, backend disabled")
                }
            }
        }

        info!(backends = ?registry.registered(), "backend registry ready");
        Ok(registry)
    }
}
