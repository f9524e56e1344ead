use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::embeddings::provider::EmbeddingProvider;
use crate::error::{PipelineError, Result};

/// Embedding provider for the Gemini batch embedding API.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f64>,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// Model names arrive with or without the `models/` prefix.
    fn qualified_model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let model = self.qualified_model();
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/{model}:batchEmbedContents?key={}",
            self.api_key
        );
        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] }
                })
            })
            .collect();
        let response = self
            .client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PipelineError::Provider(format!(
                "gemini batchEmbedContents failed with status {}",
                response.status()
            )));
        }
        let body: BatchEmbedResponse = response.json().await?;
        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn model_id(&self) -> String {
        let name = self.model.rsplit('/').next().unwrap_or(&self.model);
        format!("gemini_{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_strips_prefix() {
        let provider = GeminiProvider::new("key".to_string(), "models/embedding-001".to_string());
        assert_eq!(provider.model_id(), "gemini_embedding-001");
    }
}
