use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::embeddings::provider::EmbeddingProvider;
use crate::error::{PipelineError, Result};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Embedding provider for the OpenAI embeddings API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f64>,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PipelineError::Provider(format!(
                "openai embeddings failed with status {}",
                response.status()
            )));
        }
        let body: EmbeddingsResponse = response.json().await?;
        let mut items = body.data;
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }

    fn model_id(&self) -> String {
        format!("openai_{}", self.model)
    }
}
