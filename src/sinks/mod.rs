//! Sink writers publishing gold and enriched tables to external stores.
//!
//! Every writer returns a `WriteResult` instead of an error: a sink
//! failure is recorded by the orchestrator and never rolls back other
//! sinks. Writers must be idempotent per primary key (document ids and
//! merge keys come from the entity primary key).

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::domain::EntityType;

pub mod graph;
pub mod parquet;
pub mod search;

pub use graph::GraphSink;
pub use parquet::ParquetSink;
pub use search::SearchSink;

/// Outcome of one sink write.
#[derive(Debug, Clone, Serialize)]
pub struct WriteResult {
    pub sink: String,
    pub entity: String,
    pub success: bool,
    pub record_count: usize,
    pub error: Option<String>,
}

impl WriteResult {
    pub fn ok(sink: &str, entity: &str, record_count: usize) -> Self {
        Self {
            sink: sink.to_string(),
            entity: entity.to_string(),
            success: true,
            record_count,
            error: None,
        }
    }

    pub fn failed(sink: &str, entity: &str, error: impl Into<String>) -> Self {
        Self {
            sink: sink.to_string(),
            entity: entity.to_string(),
            success: false,
            record_count: 0,
            error: Some(error.into()),
        }
    }
}

/// A schema-adapted row ready for publication: the document id (entity
/// primary key) plus the row serialized as a JSON object.
#[derive(Debug, Clone)]
pub struct SinkDocument {
    pub id: String,
    pub body: Value,
}

/// Serialize typed rows into sink documents. The id is pulled from the
/// entity's primary-key field in the serialized body.
pub fn documents_from_rows<R: Serialize>(entity: EntityType, rows: &[R]) -> Vec<SinkDocument> {
    rows.iter()
        .filter_map(|row| {
            let body = serde_json::to_value(row).ok()?;
            let id = match body.get(entity.primary_key_field()) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return None,
            };
            Some(SinkDocument { id, body })
        })
        .collect()
}

/// Common interface for all sink variants.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Publish one entity's documents. Never propagates an error; the
    /// failure is captured in the returned `WriteResult`.
    async fn write(&self, entity: EntityType, documents: &[SinkDocument]) -> WriteResult;
}
