use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::{PipelineError, Result};

use super::providers::{gemini::GeminiProvider, mock::MockProvider, ollama::OllamaProvider,
    openai::OpenAiProvider, voyage::VoyageProvider};

/// The only thing the engine knows about an embedding backend: a batch
/// call and a model identifier. Wire protocols live behind this trait.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    /// Stable `{provider}_{model}` identifier recorded on every row.
    fn model_id(&self) -> String;
}

/// Factory producing one provider instance per embedding worker, so no
/// HTTP client state is shared across shards.
pub type ProviderFactory = Arc<dyn Fn() -> Box<dyn EmbeddingProvider> + Send + Sync>;

/// Build a provider factory for the configured backend. API keys are
/// read from the environment once, here, so a missing secret fails the
/// run before any worker spawns.
pub fn create_provider_factory(config: &EmbeddingConfig) -> Result<ProviderFactory> {
    let model = config.model.clone();
    match config.provider {
        ProviderKind::Ollama => {
            let base_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Arc::new(move || {
                Box::new(OllamaProvider::new(base_url.clone(), model.clone()))
            }))
        }
        ProviderKind::OpenAi => {
            let api_key = require_env("OPENAI_API_KEY")?;
            Ok(Arc::new(move || {
                Box::new(OpenAiProvider::new(api_key.clone(), model.clone()))
            }))
        }
        ProviderKind::Voyage => {
            let api_key = require_env("VOYAGE_API_KEY")?;
            Ok(Arc::new(move || {
                Box::new(VoyageProvider::new(api_key.clone(), model.clone()))
            }))
        }
        ProviderKind::Gemini => {
            let api_key = require_env("GEMINI_API_KEY")?;
            Ok(Arc::new(move || {
                Box::new(GeminiProvider::new(api_key.clone(), model.clone()))
            }))
        }
        ProviderKind::Mock => {
            let mock = MockProvider::new(8);
            Ok(Arc::new(move || Box::new(mock.clone())))
        }
    }
}

fn require_env(name: &'static str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| PipelineError::Config(format!("environment variable {name} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_factory_needs_no_secrets() {
        let config = EmbeddingConfig::default();
        let factory = create_provider_factory(&config).unwrap();
        let provider = factory();
        assert_eq!(provider.model_id(), "mock_embedding");
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        std::env::remove_var("VOYAGE_API_KEY");
        let config = EmbeddingConfig {
            provider: ProviderKind::Voyage,
            ..Default::default()
        };
        let result = create_provider_factory(&config);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
