//! LLM text generation backends.
//!
//! Configuration is read from the environment:
//!
//! | provider  | variables                                                  |
//! |-----------|------------------------------------------------------------|
//! | ollama    | `OLLAMA_HOST`, `OLLAMA_MODEL`                              |
//! | openai    | `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`        |
//! | anthropic | `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL`, `ANTHROPIC_MODEL` |
//!
//! `CASESYNTH_LLM_TIMEOUT_SECS` bounds every request (`0` disables it).
//!
//! The clients are blocking; the engine is synchronous. Errors never reach
//! the engine as hard failures: [`LlmGenerator`] maps them into
//! [`ContentError`], and the content generator falls back to fixed text.

pub mod providers;

use casesynth_core::{ContentError, TextGenerator};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use providers::*;

pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const OLLAMA_MODEL_ENV: &str = "OLLAMA_MODEL";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const ANTHROPIC_BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const ANTHROPIC_MODEL_ENV: &str = "ANTHROPIC_MODEL";
pub const ANTHROPIC_VERSION_ENV: &str = "ANTHROPIC_VERSION";
pub const CASESYNTH_LLM_TIMEOUT_SECS_ENV: &str = "CASESYNTH_LLM_TIMEOUT_SECS";

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;

/// System prompt shared by every backend.
pub const SYSTEM_PROMPT: &str = "You write short, realistic text for IT service management and \
healthcare case records. Reply with the requested text only, without quotes or preamble.";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAI,
    Anthropic,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Provider::Ollama => "ollama",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        })
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAI),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(ConfigError::Invalid(format!("unknown LLM provider `{other}`"))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{provider} backend requires {var} (set it in your env; do not hardcode secrets in scripts)")]
    MissingKey { provider: Provider, var: &'static str },
    #[error("{0} support was not compiled in")]
    Disabled(Provider),
    #[error("no LLM provider configured. Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or OLLAMA_HOST")]
    NoProviderConfigured,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    /// Empty for Ollama.
    pub api_key: String,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
    pub max_output_tokens: u32,
}

impl LlmConfig {
    /// Configuration for `provider` from its environment variables.
    pub fn for_provider(provider: Provider) -> Result<Self, ConfigError> {
        let timeout = llm_timeout()?;
        let config = match provider {
            Provider::Ollama => Self {
                provider,
                base_url: normalize_ollama_host(&env_or(OLLAMA_HOST_ENV, DEFAULT_OLLAMA_HOST)),
                model: env_or(OLLAMA_MODEL_ENV, DEFAULT_OLLAMA_MODEL),
                api_key: String::new(),
                timeout,
                max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            },
            Provider::OpenAI => Self {
                provider,
                base_url: normalize_http_base_url(
                    &env_or(OPENAI_BASE_URL_ENV, DEFAULT_OPENAI_BASE_URL),
                    DEFAULT_OPENAI_BASE_URL,
                ),
                model: env_or(OPENAI_MODEL_ENV, DEFAULT_OPENAI_MODEL),
                api_key: api_key(provider, OPENAI_API_KEY_ENV)?,
                timeout,
                max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            },
            Provider::Anthropic => Self {
                provider,
                base_url: normalize_http_base_url(
                    &env_or(ANTHROPIC_BASE_URL_ENV, DEFAULT_ANTHROPIC_BASE_URL),
                    DEFAULT_ANTHROPIC_BASE_URL,
                ),
                model: env_or(ANTHROPIC_MODEL_ENV, DEFAULT_ANTHROPIC_MODEL),
                api_key: api_key(provider, ANTHROPIC_API_KEY_ENV)?,
                timeout,
                max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            },
        };
        Ok(config)
    }

    /// First configured provider: OpenAI, then Anthropic, then Ollama.
    pub fn from_env() -> Result<Self, ConfigError> {
        if env_set(OPENAI_API_KEY_ENV) {
            return Self::for_provider(Provider::OpenAI);
        }
        if env_set(ANTHROPIC_API_KEY_ENV) {
            return Self::for_provider(Provider::Anthropic);
        }
        if env_set(OLLAMA_HOST_ENV) {
            return Self::for_provider(Provider::Ollama);
        }
        Err(ConfigError::NoProviderConfigured)
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_set(var: &str) -> bool {
    std::env::var(var).map_or(false, |v| !v.trim().is_empty())
}

fn api_key(provider: Provider, var: &'static str) -> Result<String, ConfigError> {
    let key = std::env::var(var).unwrap_or_default();
    let key = key.trim().to_string();
    if key.is_empty() {
        return Err(ConfigError::MissingKey { provider, var });
    }
    Ok(key)
}

/// `CASESYNTH_LLM_TIMEOUT_SECS`, or the default. `0` disables the timeout.
pub fn llm_timeout() -> Result<Option<Duration>, ConfigError> {
    let secs = match std::env::var(CASESYNTH_LLM_TIMEOUT_SECS_ENV) {
        Ok(v) => parse_timeout_secs(&v)?,
        Err(std::env::VarError::NotPresent) => DEFAULT_LLM_TIMEOUT_SECS,
        Err(e) => {
            return Err(ConfigError::Invalid(format!(
                "failed to read {CASESYNTH_LLM_TIMEOUT_SECS_ENV}: {e}"
            )))
        }
    };
    Ok(if secs == 0 { None } else { Some(Duration::from_secs(secs)) })
}

fn parse_timeout_secs(v: &str) -> Result<u64, ConfigError> {
    let v = v.trim();
    if v.is_empty() {
        return Ok(DEFAULT_LLM_TIMEOUT_SECS);
    }
    v.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!(
            "invalid {CASESYNTH_LLM_TIMEOUT_SECS_ENV}={v:?} (expected integer seconds; 0 disables)"
        ))
    })
}

pub fn normalize_ollama_host(host: &str) -> String {
    let mut host = host.trim().to_string();
    if host.is_empty() {
        // IPv4 loopback: `localhost` may resolve to ::1 where Ollama is not bound.
        host = DEFAULT_OLLAMA_HOST.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("http://{host}");
    }
    host.trim_end_matches('/').to_string()
}

pub fn normalize_http_base_url(base_url: &str, default: &str) -> String {
    let mut host = base_url.trim().to_string();
    if host.is_empty() {
        host = default.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("https://{host}");
    }
    host.trim_end_matches('/').trim_end_matches("/v1").to_string()
}

// ============================================================================
// Response text extraction
// ============================================================================

/// `message.content` of an Ollama `/api/chat` response.
pub fn ollama_extract_output_text(v: &serde_json::Value) -> Option<String> {
    let text = v.get("message")?.get("content")?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// First choice's message content of a Chat Completions response.
pub fn openai_extract_output_text(v: &serde_json::Value) -> Option<String> {
    let text = v
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Concatenated `text` blocks of a Messages API response.
pub fn anthropic_extract_output_text(v: &serde_json::Value) -> Option<String> {
    let mut out = String::new();
    let blocks = v.get("content")?.as_array()?;
    for b in blocks {
        let kind = b.get("type").and_then(|x| x.as_str()).unwrap_or("");
        if kind != "text" {
            continue;
        }
        if let Some(t) = b.get("text").and_then(|x| x.as_str()) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(t);
        }
    }
    let trimmed = out.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

// ============================================================================
// Errors and the generator
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("failed to reach {provider} at {url}: {message}")]
    Network {
        provider: Provider,
        url: String,
        message: String,
    },
    #[error("{provider} http error {status}: {body}")]
    Http {
        provider: Provider,
        status: u16,
        body: String,
    },
    #[error("{provider} returned an unexpected response: {message}")]
    InvalidResponse { provider: Provider, message: String },
}

impl From<LlmError> for ContentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Client(_) => ContentError::Unavailable(err.to_string()),
            LlmError::Network { .. } | LlmError::Http { .. } => ContentError::Request(err.to_string()),
            LlmError::InvalidResponse { .. } => ContentError::Malformed(err.to_string()),
        }
    }
}

/// A [`TextGenerator`] backed by one configured provider.
pub enum LlmGenerator {
    #[cfg(feature = "llm-ollama")]
    Ollama(OllamaClient),
    #[cfg(feature = "llm-openai")]
    OpenAI(OpenAIClient),
    #[cfg(feature = "llm-anthropic")]
    Anthropic(AnthropicClient),
    /// Uninhabited stand-in when no backend is compiled in; never constructed.
    #[cfg(not(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic")))]
    Never(std::convert::Infallible),
}

impl LlmGenerator {
    pub fn from_config(config: LlmConfig) -> Result<Self, ConfigError> {
        match config.provider {
            #[cfg(feature = "llm-ollama")]
            Provider::Ollama => Ok(Self::Ollama(OllamaClient::new(config))),
            #[cfg(feature = "llm-openai")]
            Provider::OpenAI => Ok(Self::OpenAI(OpenAIClient::new(config))),
            #[cfg(feature = "llm-anthropic")]
            Provider::Anthropic => Ok(Self::Anthropic(AnthropicClient::new(config))),
            #[allow(unreachable_patterns)]
            other => Err(ConfigError::Disabled(other)),
        }
    }

    pub fn for_provider(provider: Provider) -> Result<Self, ConfigError> {
        Self::from_config(LlmConfig::for_provider(provider)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_config(LlmConfig::from_env()?)
    }

    pub fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        match self {
            #[cfg(feature = "llm-ollama")]
            Self::Ollama(c) => c.complete(prompt),
            #[cfg(feature = "llm-openai")]
            Self::OpenAI(c) => c.complete(prompt),
            #[cfg(feature = "llm-anthropic")]
            Self::Anthropic(c) => c.complete(prompt),
            #[cfg(not(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic")))]
            Self::Never(never) => match *never {},
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            #[cfg(feature = "llm-ollama")]
            Self::Ollama(_) => Provider::Ollama,
            #[cfg(feature = "llm-openai")]
            Self::OpenAI(_) => Provider::OpenAI,
            #[cfg(feature = "llm-anthropic")]
            Self::Anthropic(_) => Provider::Anthropic,
            #[cfg(not(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic")))]
            Self::Never(never) => match *never {},
        }
    }
}

impl TextGenerator for LlmGenerator {
    fn generate(&self, prompt: &str) -> Result<String, ContentError> {
        tracing::debug!(provider = %self.provider(), chars = prompt.len(), "llm request");
        self.complete(prompt).map_err(ContentError::from)
    }

    fn name(&self) -> &str {
        match self.provider() {
            Provider::Ollama => "ollama",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}
