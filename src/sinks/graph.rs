use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::GraphSinkConfig;
use crate::domain::EntityType;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;

use super::{SinkDocument, SinkWriter, WriteResult};

/// An edge between two entity nodes, weighted by link confidence.
#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub from_entity: EntityType,
    pub from_id: String,
    pub to_entity: EntityType,
    pub to_id: String,
    pub relationship: String,
    pub weight: f64,
}

/// Graph-store sink posting parameterized merge statements to an HTTP
/// transaction endpoint. Nodes are keyed by primary key so re-writing a
/// table merges instead of duplicating.
pub struct GraphSink {
    client: reqwest::Client,
    config: GraphSinkConfig,
    password: Option<String>,
}

impl GraphSink {
    pub fn new(config: GraphSinkConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            password: std::env::var("GRAPH_STORE_PASSWORD").ok(),
        }
    }

    fn node_label(entity: EntityType) -> &'static str {
        match entity {
            EntityType::Property => "Property",
            EntityType::Neighborhood => "Neighborhood",
            EntityType::Wikipedia => "WikipediaArticle",
        }
    }

    async fn post_statements(&self, statements: Vec<Value>) -> Result<()> {
        for chunk in statements.chunks(self.config.batch_size.max(1)) {
            let mut request = self
                .client
                .post(&self.config.url)
                .json(&json!({ "statements": chunk }));
            if let Some(password) = &self.password {
                request = request.basic_auth(&self.config.username, Some(password));
            }
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(PipelineError::Sink {
                    sink: "graph".to_string(),
                    reason: format!("transaction failed with status {}", response.status()),
                });
            }
        }
        Ok(())
    }

    /// Write relationship edges produced from the enriched projections.
    pub async fn write_edges(&self, edges: &[GraphEdge]) -> WriteResult {
        if edges.is_empty() {
            return WriteResult::ok("graph", "edges", 0);
        }
        let statements: Vec<Value> = edges
            .iter()
            .map(|edge| {
                let statement = format!(
                    "MATCH (a:{} {{id: $from_id}}), (b:{} {{id: $to_id}}) \
                     MERGE (a)-[r:{}]->(b) SET r.weight = $weight",
                    Self::node_label(edge.from_entity),
                    Self::node_label(edge.to_entity),
                    edge.relationship,
                );
                json!({
                    "statement": statement,
                    "parameters": {
                        "from_id": edge.from_id,
                        "to_id": edge.to_id,
                        "weight": edge.weight,
                    }
                })
            })
            .collect();
        match self.post_statements(statements).await {
            Ok(()) => {
                metrics::sinks::records_written("graph", edges.len() as u64);
                info!(edges = edges.len(), "graph edges merged");
                WriteResult::ok("graph", "edges", edges.len())
            }
            Err(e) => {
                metrics::sinks::write_error("graph");
                warn!(error = %e, "graph edge write failed");
                WriteResult::failed("graph", "edges", e.to_string())
            }
        }
    }
}

#[async_trait]
impl SinkWriter for GraphSink {
    fn name(&self) -> &'static str {
        "graph"
    }

    async fn write(&self, entity: EntityType, documents: &[SinkDocument]) -> WriteResult {
        if documents.is_empty() {
            return WriteResult::ok("graph", entity.as_str(), 0);
        }
        let started = std::time::Instant::now();
        let label = Self::node_label(entity);
        let statements: Vec<Value> = documents
            .iter()
            .map(|document| {
                json!({
                    "statement": format!("MERGE (n:{label} {{id: $id}}) SET n += $props"),
                    "parameters": {
                        "id": document.id,
                        "props": scalar_properties(&document.body),
                    }
                })
            })
            .collect();
        let result = self.post_statements(statements).await;
        metrics::sinks::write_duration("graph", started.elapsed().as_secs_f64());
        match result {
            Ok(()) => {
                metrics::sinks::records_written("graph", documents.len() as u64);
                info!(entity = %entity, nodes = documents.len(), "graph nodes merged");
                WriteResult::ok("graph", entity.as_str(), documents.len())
            }
            Err(e) => {
                metrics::sinks::write_error("graph");
                warn!(entity = %entity, error = %e, "graph node write failed");
                WriteResult::failed("graph", entity.as_str(), e.to_string())
            }
        }
    }
}

/// Graph node properties are flat scalars; nested structures and nulls
/// are dropped from the property map.
fn scalar_properties(body: &Value) -> Value {
    match body {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        _ => json!({}),
    }
}
