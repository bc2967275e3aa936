//! Configuration system for ragbot
//!
//! Supports loading configuration from:
//! 1. CLI --config argument
//! 2. ~/.config/ragbot/config.{RAGBOT_ENV}.json
//! 3. Default values
//!
//! Where RAGBOT_ENV can be: production (default), development, test
//!
//! # Examples
//!
//! ```
//! use ragbot::config::{AppConfig, ModelProvider};
//!
//! let mut config = AppConfig::default();
//! config.generation.provider = ModelProvider::Ollama;
//! config.generation.url = "http://localhost:11434".to_string();
//! config.generation.model = "qwen3:8b".to_string();
//! config.validate().unwrap();
//! ```
//!
//! ## Environment Variables
//!
//! Environment variables override config file values:
//! - RAGBOT_PROVIDER
//! - RAGBOT_MODEL
//! - RAGBOT_OLLAMA_URL
//! - RAGBOT_OFFLINE (use the hashing embedder)
//! - OPENAI_API_KEY / ANTHROPIC_API_KEY / GROQ_API_KEY

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    Ollama,
    #[default]
    OpenAI,
    Anthropic,
    Groq,
}

impl ModelProvider {
    fn default_url(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
        }
    }

    fn default_api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
        }
    }
}

impl std::fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Groq => write!(f, "groq"),
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "groq" => Ok(Self::Groq),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown provider: {}",
                s
            ))),
        }
    }
}

/// Configuration for the answer-generating model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider type
    pub provider: ModelProvider,

    /// API base URL
    pub url: String,

    /// Model name
    pub model: String,

    /// API key (can be environment variable name like "OPENAI_API_KEY")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top P sampling (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

fn default_temperature() -> f32 {
    0.4
}

fn default_top_p() -> f32 {
    1.0
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_provider(ModelProvider::default(), "gpt-3.5-turbo")
    }
}

impl ModelConfig {
    /// Defaults for a provider: its public endpoint and API key variable
    pub fn for_provider(provider: ModelProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            url: provider.default_url().to_string(),
            model: model.into(),
            api_key: provider.default_api_key_var().map(str::to_string),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::ValidationError(format!(
                "Top P must be between 0.0 and 1.0, got {}",
                self.top_p
            )));
        }

        if self.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "URL cannot be empty".to_string(),
            ));
        }

        if self.model.is_empty() {
            return Err(ConfigError::ValidationError(
                "Model name cannot be empty".to_string(),
            ));
        }

        if self.provider != ModelProvider::Ollama && self.api_key.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "API key required for {} provider",
                self.provider
            )));
        }

        Ok(())
    }

    /// Resolve API key from environment variable if needed
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.as_ref().and_then(|key| {
            if key.chars().all(|c| c.is_uppercase() || c == '_') {
                std::env::var(key).ok()
            } else {
                Some(key.clone())
            }
        })
    }
}

/// Which embedder the process uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    FastEmbed,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// FastEmbed model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Number of recently embedded texts kept in memory
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Vector length for the hashing backend
    #[serde(default = "default_hashing_dimension")]
    pub hashing_dimension: usize,
}

fn default_embedding_model() -> String {
    crate::embedding::DEFAULT_MODEL_NAME.to_string()
}

fn default_cache_size() -> usize {
    1000
}

fn default_hashing_dimension() -> usize {
    512
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: default_embedding_model(),
            cache_size: default_cache_size(),
            hashing_dimension: default_hashing_dimension(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum passage length in characters
    pub chunk_size: usize,

    /// Characters shared by consecutive passages
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model that writes the answers
    #[serde(default)]
    pub generation: ModelConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Passages retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Upper bound for one generation call, in seconds
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Largest accepted upload, in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,

    /// Login sessions expire after this many hours
    #[serde(default = "default_session_timeout")]
    pub session_timeout_hours: i64,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_top_k() -> usize {
    crate::rag::DEFAULT_TOP_K
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_max_document_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_session_timeout() -> i64 {
    24
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: ModelConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            top_k: default_top_k(),
            generation_timeout_secs: default_generation_timeout(),
            max_document_bytes: default_max_document_bytes(),
            session_timeout_hours: default_session_timeout(),
            debug: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration with standard priority:
    /// 1. Explicit path
    /// 2. ~/.config/ragbot/config.{RAGBOT_ENV}.json
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit_path {
            if path.exists() {
                tracing::info!("Loading config from: {:?}", path);
                return Self::from_file(path);
            } else {
                return Err(ConfigError::ValidationError(format!(
                    "Config file not found: {:?}",
                    path
                )));
            }
        }

        let env = std::env::var("RAGBOT_ENV").unwrap_or_else(|_| "production".to_string());

        if let Some(config_dir) = Self::config_dir() {
            let config_path = config_dir.join(format!("config.{}.json", env));

            if config_path.exists() {
                tracing::info!("Loading config from: {:?}", config_path);
                return Self::from_file(&config_path);
            }
        }

        tracing::info!("Using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(provider) = std::env::var("RAGBOT_PROVIDER") {
            match provider.parse::<ModelProvider>() {
                Ok(provider) if provider != self.generation.provider => {
                    let model = std::mem::take(&mut self.generation.model);
                    self.generation = ModelConfig {
                        temperature: self.generation.temperature,
                        top_p: self.generation.top_p,
                        max_tokens: self.generation.max_tokens,
                        ..ModelConfig::for_provider(provider, model)
                    };
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Ignoring RAGBOT_PROVIDER: {}", e),
            }
        }

        if let Ok(model) = std::env::var("RAGBOT_MODEL") {
            self.generation.model = model;
        }

        if let Ok(url) = std::env::var("RAGBOT_OLLAMA_URL") {
            if self.generation.provider == ModelProvider::Ollama {
                self.generation.url = url;
            }
        }

        if let Ok(offline) = std::env::var("RAGBOT_OFFLINE") {
            if offline.eq_ignore_ascii_case("true") || offline == "1" {
                self.embedding.backend = EmbeddingBackend::Hashing;
            }
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.generation.validate()?;
        self.chunking.validate()?;

        if self.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "top_k must be greater than 0".to_string(),
            ));
        }

        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "generation_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_document_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_document_bytes must be greater than 0".to_string(),
            ));
        }

        if self.session_timeout_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "session_timeout_hours must be greater than 0".to_string(),
            ));
        }

        if self.embedding.backend == EmbeddingBackend::Hashing && self.embedding.hashing_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "hashing_dimension must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ragbot"))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generation.provider, ModelProvider::OpenAI);
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_document_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_model_config_validation() {
        let mut config = ModelConfig::default();
        assert!(config.validate().is_ok());

        config.temperature = 3.0;
        assert!(config.validate().is_err());

        config.temperature = 0.7;
        config.top_p = 1.5;
        assert!(config.validate().is_err());

        let mut config = ModelConfig::for_provider(ModelProvider::Anthropic, "claude");
        config.api_key = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunking_validation() {
        let config = ChunkingConfig { chunk_size: 100, chunk_overlap: 100 };
        assert!(config.validate().is_err());
        let config = ChunkingConfig { chunk_size: 0, chunk_overlap: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("ollama".parse::<ModelProvider>().unwrap(), ModelProvider::Ollama);
        assert_eq!("openai".parse::<ModelProvider>().unwrap(), ModelProvider::OpenAI);
        assert_eq!("ANTHROPIC".parse::<ModelProvider>().unwrap(), ModelProvider::Anthropic);
        assert!("invalid".parse::<ModelProvider>().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"generation": {"provider": "ollama", "url": "http://localhost:11434", "model": "llama3"},
                "chunking": {"chunk_size": 500, "chunk_overlap": 50}}"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_serialize_config() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.generation.model, parsed.generation.model);
    }
}
