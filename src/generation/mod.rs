//! Answer generation
//!
//! [`Generator`] sends an assembled prompt to one language model and returns
//! the raw answer text. Each call is bounded by a timeout and never retried.

mod provider;

pub use provider::{
    create_provider, AnthropicProvider, ModelProvider, OllamaProvider, OpenAICompatibleProvider,
    ProviderError, ProviderResponse,
};

use crate::config::ModelConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation failed: {0}")]
    Failure(String),

    #[error("Generation timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
}

pub struct Generator {
    provider: Arc<dyn ModelProvider>,
    timeout: Duration,
}

impl Generator {
    pub fn new(provider: Arc<dyn ModelProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Build a generator from configuration
    pub fn from_config(config: ModelConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let provider = create_provider(config).map_err(|e| GenerationError::Failure(e.to_string()))?;
        Ok(Self::new(Arc::from(provider), timeout))
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Generate an answer for `prompt`. The model's text is returned as is.
    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        tracing::debug!(
            "Generating with {} ({} chars of prompt)",
            self.provider.model_name(),
            prompt.len()
        );

        match tokio::time::timeout(self.timeout, self.provider.generate(prompt)).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    "Generation finished: model={}, finish_reason={:?}",
                    response.model,
                    response.finish_reason
                );
                Ok(response.content)
            }
            Ok(Err(ProviderError::Timeout)) | Err(_) => {
                tracing::warn!("Generation timed out after {:?}", self.timeout);
                Err(GenerationError::Timeout(self.timeout))
            }
            Ok(Err(e)) => {
                tracing::warn!("Generation failed: {}", e);
                Err(GenerationError::Failure(e.to_string()))
            }
        }
    }
}
