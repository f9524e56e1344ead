use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::embeddings::provider::EmbeddingProvider;
use crate::error::{PipelineError, Result};

/// Embedding provider backed by a local Ollama server.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f64>>,
}

impl OllamaProvider {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PipelineError::Provider(format!(
                "ollama embed failed with status {}",
                response.status()
            )));
        }
        let body: EmbedResponse = response.json().await?;
        Ok(body.embeddings)
    }

    fn model_id(&self) -> String {
        format!("ollama_{}", self.model)
    }
}
