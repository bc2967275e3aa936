//! Model provider abstraction for different LLM APIs
//!
//! Supports:
//! - Ollama (local models)
//! - OpenAI-compatible chat completions (OpenAI, Groq)
//! - Anthropic messages API
//!
//! # Example
//!
//! ```no_run
//! use ragbot::config::{ModelConfig, ModelProvider as ProviderType};
//! use ragbot::generation::create_provider;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ModelConfig::for_provider(ProviderType::Ollama, "qwen3:8b");
//! let provider = create_provider(config)?;
//! let response = provider.generate("Hello, world!").await?;
//! println!("Response: {}", response.content);
//! # Ok(())
//! # }
//! ```

use crate::config::{ModelConfig, ModelProvider as ProviderType};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// HTTP-level ceiling; the per-call deadline is enforced by `Generator`
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::ConnectionError(e.to_string())
        }
    }
}

/// Response from a model provider
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Model provider trait
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the provider type
    fn provider_type(&self) -> ProviderType;
}

/// Create a model provider from configuration
pub fn create_provider(config: ModelConfig) -> Result<Box<dyn ModelProvider>, ProviderError> {
    match config.provider {
        ProviderType::Ollama => Ok(Box::new(OllamaProvider::new(config))),
        ProviderType::OpenAI | ProviderType::Groq => {
            Ok(Box::new(OpenAICompatibleProvider::new(config)?))
        }
        ProviderType::Anthropic => Ok(Box::new(AnthropicProvider::new(config)?)),
    }
}

fn http_client() -> Client {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

fn require_api_key(config: &ModelConfig) -> Result<String, ProviderError> {
    config
        .resolve_api_key()
        .ok_or_else(|| ProviderError::AuthError(format!("{} API key not found", config.provider)))
}

/// Send a request and decode the JSON body, mapping HTTP failures
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProviderError> {
    let response = request.send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::AuthError(format!("HTTP {}", status)));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ModelError(format!("HTTP {}: {}", status, body)));
    }

    Ok(response.json().await?)
}

// ============================================================================
// Ollama Provider
// ============================================================================

pub struct OllamaProvider {
    config: ModelConfig,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: http_client(),
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    done: bool,
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/generate", self.config.url.trim_end_matches('/'));

        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                num_predict: self.config.max_tokens,
            },
        };

        let response: OllamaResponse = send_json(self.client.post(&url).json(&request)).await?;

        Ok(ProviderResponse {
            content: response.response,
            model: response.model,
            finish_reason: Some(if response.done { "stop" } else { "length" }.to_string()),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Ollama
    }
}

// ============================================================================
// OpenAI-compatible Provider (OpenAI, Groq)
// ============================================================================

pub struct OpenAICompatibleProvider {
    config: ModelConfig,
    client: Client,
    api_key: String,
}

impl OpenAICompatibleProvider {
    pub fn new(config: ModelConfig) -> Result<Self, ProviderError> {
        let api_key = require_api_key(&config)?;
        Ok(Self {
            config,
            client: http_client(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ModelProvider for OpenAICompatibleProvider {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.config.url.trim_end_matches('/'));

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
        };

        let response: ChatResponse = send_json(
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            model: response.model,
            finish_reason: choice.finish_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_type(&self) -> ProviderType {
        self.config.provider
    }
}

// ============================================================================
// Anthropic Provider
// ============================================================================

pub struct AnthropicProvider {
    config: ModelConfig,
    client: Client,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(config: ModelConfig) -> Result<Self, ProviderError> {
        let api_key = require_api_key(&config)?;
        Ok(Self {
            config,
            client: http_client(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/messages", self.config.url.trim_end_matches('/'));

        let request = AnthropicRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens.unwrap_or(1024),
            temperature: self.config.temperature.min(1.0),
            top_p: self.config.top_p,
        };

        let response: AnthropicResponse = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&request),
        )
        .await?;

        let content = response
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ProviderResponse {
            content,
            model: response.model,
            finish_reason: response.stop_reason,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_creation() {
        let config = ModelConfig::for_provider(ProviderType::Ollama, "qwen3:8b");
        let provider = create_provider(config).unwrap();
        assert_eq!(provider.model_name(), "qwen3:8b");
        assert_eq!(provider.provider_type(), ProviderType::Ollama);
    }

    #[test]
    fn test_groq_uses_openai_compatible_provider() {
        let mut config = ModelConfig::for_provider(ProviderType::Groq, "llama-3.1-8b-instant");
        config.api_key = Some("gsk-test-key".to_string());
        let provider = create_provider(config).unwrap();
        assert_eq!(provider.provider_type(), ProviderType::Groq);
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = ModelConfig::for_provider(ProviderType::OpenAI, "gpt-4o-mini");
        config.api_key = None;
        assert!(matches!(
            create_provider(config),
            Err(ProviderError::AuthError(_))
        ));
    }

    #[test]
    fn test_chat_response_without_content() {
        let body = r#"{"model": "m", "choices": [{"message": {"role": "assistant"}, "finish_reason": "stop"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
