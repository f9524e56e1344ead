use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::domain::EntityType;
use crate::observability::metrics;

use super::chunking::chunk_text;
use super::provider::ProviderFactory;

/// One row of the `{entity}_gold_embeddings_{runId}` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRow {
    pub primary_key: String,
    pub chunk_index: usize,
    pub chunk_total: usize,
    pub node_id: Uuid,
    /// Null when the provider permanently failed for this node.
    pub vector: Option<Vec<f64>>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub embedded_at: DateTime<Utc>,
    pub node_metadata: NodeMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub entity: EntityType,
    pub source_table: String,
    pub text_length: usize,
}

/// Aggregate outcome of one embedding pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbeddingStats {
    pub rows_in: usize,
    pub rows_skipped_empty: usize,
    pub nodes_total: usize,
    pub nodes_embedded: usize,
    pub nodes_failed: usize,
    pub retries: usize,
    pub dimension: Option<usize>,
    /// Set when non-null vectors disagree on dimension; the run is
    /// degraded but not failed.
    pub degraded: bool,
    pub cancelled: bool,
}

/// One unit of text headed to the provider.
#[derive(Debug, Clone)]
struct EmbeddingNode {
    primary_key: String,
    chunk_index: usize,
    chunk_total: usize,
    text: String,
}

/// Sharded, batched embedding engine.
///
/// Nodes are partitioned into contiguous shards, one worker per shard,
/// each with its own provider instance. Within a shard, nodes go to the
/// provider in sub-batches with per-call timeout and exponential-backoff
/// retry. Results flow through a bounded channel so a slow consumer
/// applies backpressure instead of unbounded buffering.
pub struct EmbeddingEngine {
    embedding: EmbeddingConfig,
    chunking: ChunkingConfig,
    parallelism: usize,
}

struct BatchOutcome {
    rows: Vec<EmbeddingRow>,
    embedded: usize,
    failed: usize,
    retries: usize,
}

impl EmbeddingEngine {
    pub fn new(embedding: EmbeddingConfig, chunking: ChunkingConfig, parallelism: usize) -> Self {
        Self {
            embedding,
            chunking,
            parallelism: parallelism.max(1),
        }
    }

    /// Embed the text column of a gold table. Returns the embedding rows
    /// and pass statistics; provider failures degrade (null vectors)
    /// rather than abort.
    pub async fn embed(
        &self,
        entity: EntityType,
        source_table: &str,
        texts: Vec<(String, String)>,
        factory: ProviderFactory,
        cancel: watch::Receiver<bool>,
    ) -> (Vec<EmbeddingRow>, EmbeddingStats) {
        let mut stats = EmbeddingStats {
            rows_in: texts.len(),
            ..Default::default()
        };

        // Build nodes; rows with empty text produce none.
        let mut nodes = Vec::new();
        for (primary_key, text) in &texts {
            let chunks = chunk_text(text, &self.chunking);
            if chunks.is_empty() {
                stats.rows_skipped_empty += 1;
                continue;
            }
            let chunk_total = chunks.len();
            for (chunk_index, chunk) in chunks.into_iter().enumerate() {
                nodes.push(EmbeddingNode {
                    primary_key: primary_key.clone(),
                    chunk_index,
                    chunk_total,
                    text: chunk,
                });
            }
        }
        stats.nodes_total = nodes.len();
        metrics::embedding::nodes_total(entity.as_str(), nodes.len() as u64);

        let model_id = factory().model_id();
        info!(
            entity = %entity,
            model = %model_id,
            nodes = nodes.len(),
            skipped_empty = stats.rows_skipped_empty,
            "embedding pass starting"
        );
        if nodes.is_empty() {
            return (Vec::new(), stats);
        }

        let batch_size = self.embedding.batch_size.max(1);
        let shard_count = self
            .parallelism
            .min(nodes.len().div_ceil(batch_size))
            .max(1);
        let shard_size = nodes.len().div_ceil(shard_count);

        // Bounded output channel: two batches in flight per shard.
        let (tx, mut rx) = mpsc::channel::<BatchOutcome>(shard_count * 2);

        let mut handles = Vec::with_capacity(shard_count);
        let mut remaining = nodes;
        for _ in 0..shard_count {
            let shard: Vec<EmbeddingNode> = if remaining.len() > shard_size {
                let rest = remaining.split_off(shard_size);
                std::mem::replace(&mut remaining, rest)
            } else {
                std::mem::take(&mut remaining)
            };
            if shard.is_empty() {
                continue;
            }
            let worker = ShardWorker {
                entity,
                source_table: source_table.to_string(),
                model_id: model_id.clone(),
                batch_size,
                max_retries: self.embedding.max_retries,
                retry_delay: Duration::from_millis(self.embedding.retry_delay_ms),
                timeout: Duration::from_millis(self.embedding.timeout_ms),
            };
            let provider_factory = factory.clone();
            let sender = tx.clone();
            let cancel_rx = cancel.clone();
            handles.push(tokio::spawn(async move {
                worker.run(shard, provider_factory, sender, cancel_rx).await
            }));
        }
        drop(tx);

        let mut rows = Vec::with_capacity(stats.nodes_total);
        while let Some(outcome) = rx.recv().await {
            stats.nodes_embedded += outcome.embedded;
            stats.nodes_failed += outcome.failed;
            stats.retries += outcome.retries;
            rows.extend(outcome.rows);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "embedding shard worker panicked");
                stats.degraded = true;
            }
        }
        stats.cancelled = *cancel.borrow();

        // Vector dimensions must be uniform across non-null vectors.
        let dimensions: HashSet<usize> = rows
            .iter()
            .filter_map(|row| row.vector.as_ref().map(|v| v.len()))
            .collect();
        match dimensions.len() {
            0 => {}
            1 => stats.dimension = dimensions.into_iter().next(),
            _ => {
                warn!(?dimensions, "embedding dimension mismatch across vectors");
                stats.degraded = true;
            }
        }

        metrics::embedding::nodes_embedded(entity.as_str(), stats.nodes_embedded as u64);
        metrics::embedding::nodes_failed(entity.as_str(), stats.nodes_failed as u64);
        info!(
            entity = %entity,
            embedded = stats.nodes_embedded,
            failed = stats.nodes_failed,
            retries = stats.retries,
            degraded = stats.degraded,
            "embedding pass finished"
        );
        (rows, stats)
    }
}

struct ShardWorker {
    entity: EntityType,
    source_table: String,
    model_id: String,
    batch_size: usize,
    max_retries: usize,
    retry_delay: Duration,
    timeout: Duration,
}

impl ShardWorker {
    async fn run(
        &self,
        shard: Vec<EmbeddingNode>,
        factory: ProviderFactory,
        sender: mpsc::Sender<BatchOutcome>,
        cancel: watch::Receiver<bool>,
    ) {
        // One provider instance per shard; no shared HTTP state.
        let provider = factory();
        for batch in shard.chunks(self.batch_size) {
            // Cooperative cancellation at sub-batch boundaries.
            if *cancel.borrow() {
                break;
            }
            let outcome = self.embed_batch(batch, provider.as_ref(), &cancel).await;
            // Blocking on a full channel is the backpressure mechanism.
            if sender.send(outcome).await.is_err() {
                break;
            }
        }
    }

    async fn embed_batch(
        &self,
        batch: &[EmbeddingNode],
        provider: &dyn super::provider::EmbeddingProvider,
        cancel: &watch::Receiver<bool>,
    ) -> BatchOutcome {
        let texts: Vec<String> = batch.iter().map(|n| n.text.clone()).collect();
        let started = std::time::Instant::now();
        let mut retries = 0usize;
        let mut vectors: Option<Vec<Vec<f64>>> = None;

        for attempt in 0..=self.max_retries {
            match tokio::time::timeout(self.timeout, provider.embed_batch(&texts)).await {
                Ok(Ok(result)) => {
                    vectors = Some(result);
                    break;
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "embedding sub-batch failed");
                }
                Err(_) => {
                    warn!(attempt, timeout_ms = self.timeout.as_millis() as u64, "embedding sub-batch timed out");
                }
            }
            if attempt == self.max_retries || *cancel.borrow() {
                break;
            }
            retries += 1;
            metrics::embedding::retry(&self.model_id);
            let delay = self.retry_delay * 2u32.saturating_pow(attempt as u32);
            tokio::time::sleep(delay).await;
        }
        metrics::embedding::batch_duration(&self.model_id, started.elapsed().as_secs_f64());

        let embedded_at = Utc::now();
        let mut embedded = 0usize;
        let mut failed = 0usize;
        let rows: Vec<EmbeddingRow> = batch
            .iter()
            .enumerate()
            .map(|(i, node)| {
                // A short response marks the overflow nodes as failed.
                let vector = vectors.as_ref().and_then(|vs| vs.get(i)).cloned();
                let dimension = vector.as_ref().map(|v| v.len()).unwrap_or(0);
                if vector.is_some() {
                    embedded += 1;
                } else {
                    failed += 1;
                }
                EmbeddingRow {
                    primary_key: node.primary_key.clone(),
                    chunk_index: node.chunk_index,
                    chunk_total: node.chunk_total,
                    node_id: Uuid::new_v4(),
                    vector,
                    embedding_model: self.model_id.clone(),
                    embedding_dimension: dimension,
                    embedded_at,
                    node_metadata: NodeMetadata {
                        entity: self.entity,
                        source_table: self.source_table.clone(),
                        text_length: node.text.chars().count(),
                    },
                }
            })
            .collect();

        BatchOutcome {
            rows,
            embedded,
            failed,
            retries,
        }
    }
}
