use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::embeddings::provider::EmbeddingProvider;
use crate::error::{PipelineError, Result};

/// Deterministic in-process provider for tests and dry runs.
///
/// Vectors are derived from a sha256 of the text so identical inputs
/// always embed identically. Failures and short responses can be
/// scripted per call to exercise the engine's degradation paths. The
/// call counter is shared across clones, so a factory handing a clone
/// to each worker still scripts failures globally.
#[derive(Clone)]
pub struct MockProvider {
    dimension: usize,
    fail_on_calls: HashSet<usize>,
    truncate_on_calls: HashSet<usize>,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_on_calls: HashSet::new(),
            truncate_on_calls: HashSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the nth embed_batch call (0-based) with a provider error.
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_calls.insert(call);
        self
    }

    /// Return one vector fewer than requested on the nth call.
    pub fn truncate_on_call(mut self, call: usize) -> Self {
        self.truncate_on_calls.insert(call);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f64> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimension)
            .map(|i| {
                let byte = digest[i % digest.len()];
                byte as f64 / 255.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_calls.contains(&call) {
            return Err(PipelineError::Provider(format!(
                "mock provider scripted failure on call {call}"
            )));
        }
        let mut vectors: Vec<Vec<f64>> = texts.iter().map(|t| self.vector_for(t)).collect();
        if self.truncate_on_calls.contains(&call) && !vectors.is_empty() {
            vectors.pop();
        }
        Ok(vectors)
    }

    fn model_id(&self) -> String {
        "mock_embedding".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vectors_are_deterministic() {
        let provider = MockProvider::new(8);
        let texts = vec!["hello".to_string(), "world".to_string()];
        let first = provider.embed_batch(&texts).await.unwrap();
        let second = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].len(), 8);
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn test_scripted_failure_and_truncation() {
        let provider = MockProvider::new(4).fail_on_call(0).truncate_on_call(1);
        let texts = vec!["a".to_string(), "b".to_string()];
        assert!(provider.embed_batch(&texts).await.is_err());
        let vectors = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_call_counter() {
        let provider = MockProvider::new(4).fail_on_call(1);
        let clone = provider.clone();
        let texts = vec!["a".to_string()];
        assert!(provider.embed_batch(&texts).await.is_ok());
        assert!(clone.embed_batch(&texts).await.is_err());
    }
}
