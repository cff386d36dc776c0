//! Blocking HTTP clients, one per provider.

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
use crate::{LlmConfig, LlmError, Provider, SYSTEM_PROMPT};
#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
use serde_json::json;

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
fn build_client(config: &LlmConfig) -> Result<reqwest::blocking::Client, LlmError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| LlmError::Client(e.to_string()))
}

/// POST `body` and return the decoded JSON, mapping transport and status errors.
#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
fn post_json(
    provider: Provider,
    request: reqwest::blocking::RequestBuilder,
    url: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value, LlmError> {
    let resp = request.json(body).send().map_err(|e| LlmError::Network {
        provider,
        url: url.to_string(),
        message: e.to_string(),
    })?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(LlmError::Http {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    resp.json().map_err(|e| LlmError::InvalidResponse {
        provider,
        message: format!("invalid json: {e}"),
    })
}

#[cfg(any(feature = "llm-ollama", feature = "llm-openai", feature = "llm-anthropic"))]
fn no_text(provider: Provider) -> LlmError {
    LlmError::InvalidResponse {
        provider,
        message: "response carried no text".to_string(),
    }
}

// ============================================================================
// Ollama
// ============================================================================

#[cfg(feature = "llm-ollama")]
pub struct OllamaClient {
    config: LlmConfig,
}

#[cfg(feature = "llm-ollama")]
impl OllamaClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    pub fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "options": { "temperature": 0.7 }
        });
        let client = build_client(&self.config)?;
        let v = post_json(Provider::Ollama, client.post(&url), &url, &body)?;
        crate::ollama_extract_output_text(&v).ok_or_else(|| no_text(Provider::Ollama))
    }
}

// ============================================================================
// OpenAI
// ============================================================================

#[cfg(feature = "llm-openai")]
pub struct OpenAIClient {
    config: LlmConfig,
}

#[cfg(feature = "llm-openai")]
impl OpenAIClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    pub fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_output_tokens,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ]
        });
        let client = build_client(&self.config)?;
        let request = client.post(&url).bearer_auth(&self.config.api_key);
        let v = post_json(Provider::OpenAI, request, &url, &body)?;
        crate::openai_extract_output_text(&v).ok_or_else(|| no_text(Provider::OpenAI))
    }
}

// ============================================================================
// Anthropic
// ============================================================================

#[cfg(feature = "llm-anthropic")]
pub struct AnthropicClient {
    config: LlmConfig,
    version: String,
}

#[cfg(feature = "llm-anthropic")]
impl AnthropicClient {
    pub fn new(config: LlmConfig) -> Self {
        let version = std::env::var(crate::ANTHROPIC_VERSION_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| crate::DEFAULT_ANTHROPIC_VERSION.to_string());
        Self { config, version }
    }

    pub fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_output_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        });
        let client = build_client(&self.config)?;
        let request = client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.version);
        let v = post_json(Provider::Anthropic, request, &url, &body)?;
        crate::anthropic_extract_output_text(&v).ok_or_else(|| no_text(Provider::Anthropic))
    }
}
