use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::SearchSinkConfig;
use crate::domain::EntityType;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;

use super::{SinkDocument, SinkWriter, WriteResult};

/// Search-index sink speaking the Elasticsearch bulk protocol.
///
/// Documents are indexed with the entity primary key as `_id`, so
/// re-running a table is an upsert, not a duplicate.
pub struct SearchSink {
    client: reqwest::Client,
    config: SearchSinkConfig,
    password: Option<String>,
}

impl SearchSink {
    pub fn new(config: SearchSinkConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            password: std::env::var("ES_PASSWORD").ok(),
        }
    }

    fn host(&self) -> &str {
        self.config
            .hosts
            .first()
            .map(|s| s.as_str())
            .unwrap_or("http://localhost:9200")
            .trim_end_matches('/')
    }

    fn index_name(&self, entity: EntityType) -> String {
        format!("{}_{}", self.config.index_prefix, entity.as_str())
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match (&self.config.username, &self.password) {
            (Some(user), Some(password)) => builder.basic_auth(user, Some(password)),
            (Some(user), None) => builder.basic_auth(user, None::<&str>),
            (None, Some(password)) => builder.basic_auth("elastic", Some(password)),
            (None, None) => builder,
        }
    }

    /// Lightweight write-then-delete probe against a scratch index.
    pub async fn validate_connection(&self) -> Result<()> {
        let probe_index = format!("{}_connection_probe", self.config.index_prefix);
        let url = format!("{}/{}/_doc/probe", self.host(), probe_index);
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&json!({"probe": true}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PipelineError::Sink {
                sink: "search".to_string(),
                reason: format!("probe write failed with status {}", response.status()),
            });
        }
        let delete_url = format!("{}/{}", self.host(), probe_index);
        let _ = self.request(reqwest::Method::DELETE, delete_url).send().await;
        Ok(())
    }

    async fn bulk_write(&self, entity: EntityType, documents: &[SinkDocument]) -> Result<usize> {
        let index = self.index_name(entity);
        let mut written = 0usize;
        for chunk in documents.chunks(self.config.bulk_size.max(1)) {
            let mut body = String::with_capacity(chunk.len() * 256);
            for document in chunk {
                let action = json!({"index": {"_index": index, "_id": document.id}});
                body.push_str(&action.to_string());
                body.push('\n');
                body.push_str(&to_search_document(entity, &document.body).to_string());
                body.push('\n');
            }
            let url = format!("{}/_bulk", self.host());
            let response = self
                .request(reqwest::Method::POST, url)
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(PipelineError::Sink {
                    sink: "search".to_string(),
                    reason: format!("bulk request failed with status {}", response.status()),
                });
            }
            let result: Value = response.json().await?;
            let errored = result
                .get("errors")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if errored {
                let failed = result
                    .get("items")
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter(|item| {
                                item.get("index")
                                    .and_then(|i| i.get("error"))
                                    .is_some()
                            })
                            .count()
                    })
                    .unwrap_or(0);
                warn!(entity = %entity, failed, "bulk response reported item errors");
                written += chunk.len() - failed;
            } else {
                written += chunk.len();
            }
        }
        Ok(written)
    }
}

/// Schema adaptation for the search index: drop excluded fields and
/// synthesize a `location` geo-point when both coordinates are present.
/// Numbers are already double-precision in the JSON projection.
fn to_search_document(entity: EntityType, body: &Value) -> Value {
    let mut doc = body.clone();
    if let Value::Object(map) = &mut doc {
        let latitude = map.get("latitude").and_then(Value::as_f64);
        let longitude = map.get("longitude").and_then(Value::as_f64);
        if let (Some(lat), Some(lon)) = (latitude, longitude) {
            map.insert("location".to_string(), json!({"lat": lat, "lon": lon}));
        }
        map.insert("entity_type".to_string(), json!(entity.as_str()));
    }
    doc
}

fn drop_excluded(doc: &mut Value, excluded: &[String]) {
    if let Value::Object(map) = doc {
        for field in excluded {
            map.remove(field);
        }
    }
}

#[async_trait]
impl SinkWriter for SearchSink {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn write(&self, entity: EntityType, documents: &[SinkDocument]) -> WriteResult {
        if documents.is_empty() {
            return WriteResult::ok("search", entity.as_str(), 0);
        }
        let started = std::time::Instant::now();
        let prepared: Vec<SinkDocument> = documents
            .iter()
            .map(|d| {
                let mut body = d.body.clone();
                drop_excluded(&mut body, &self.config.excluded_fields);
                SinkDocument {
                    id: d.id.clone(),
                    body,
                }
            })
            .collect();
        let result = self.bulk_write(entity, &prepared).await;
        metrics::sinks::write_duration("search", started.elapsed().as_secs_f64());
        match result {
            Ok(count) => {
                metrics::sinks::records_written("search", count as u64);
                info!(entity = %entity, indexed = count, index = %self.index_name(entity), "search index updated");
                WriteResult::ok("search", entity.as_str(), count)
            }
            Err(e) => {
                metrics::sinks::write_error("search");
                warn!(entity = %entity, error = %e, "search write failed");
                WriteResult::failed("search", entity.as_str(), e.to_string())
            }
        }
    }
}
