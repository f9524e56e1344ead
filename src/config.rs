use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, Result};

static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Top-level pipeline configuration, usually loaded from a TOML file.
///
/// String values support `${VAR_NAME}` placeholders which are substituted
/// from the process environment at load time. Secrets (provider API keys,
/// sink passwords) are never stored here; they are read from the
/// environment by the component that needs them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub run: RunConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Optional cap on rows read per source.
    pub sample_size: Option<usize>,
    /// Worker cap across entities and embedding shards.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Halt sibling orchestrators when one entity fails.
    #[serde(default)]
    pub stop_on_error: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sample_size: None,
            parallelism: default_parallelism(),
            stop_on_error: false,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourcesConfig {
    /// JSON array file or directory of JSON files with property listings.
    pub properties: String,
    /// JSON array file or directory with neighborhood records.
    pub neighborhoods: String,
    /// SQLite database holding `articles` and `page_summaries`.
    pub wikipedia_db: String,
    /// JSON array of `{state, county, city, neighborhood}` reference rows.
    pub locations: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    /// City abbreviation to canonical name mappings.
    #[serde(default = "default_city_abbreviations")]
    pub city_abbreviations: HashMap<String, String>,
    /// State abbreviation to canonical name mappings.
    #[serde(default = "default_state_abbreviations")]
    pub state_abbreviations: HashMap<String, String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            city_abbreviations: default_city_abbreviations(),
            state_abbreviations: default_state_abbreviations(),
        }
    }
}

fn default_city_abbreviations() -> HashMap<String, String> {
    [
        ("SF", "San Francisco"),
        ("PC", "Park City"),
        ("NYC", "New York City"),
        ("LA", "Los Angeles"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_state_abbreviations() -> HashMap<String, String> {
    [
        ("CA", "California"),
        ("UT", "Utah"),
        ("NY", "New York"),
        ("TX", "Texas"),
        ("FL", "Florida"),
        ("WA", "Washington"),
        ("OR", "Oregon"),
        ("NV", "Nevada"),
        ("AZ", "Arizona"),
        ("CO", "Colorado"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Voyage,
    Gemini,
    Mock,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Voyage => "voyage",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mock => "mock",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL for self-hosted providers (ollama).
    pub api_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Mock
}
fn default_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_batch_size() -> usize {
    20
}
fn default_max_retries() -> usize {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMethod {
    None,
    Simple,
    Sentence,
    /// Accepted for compatibility; falls back to sentence splitting.
    Semantic,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_chunking_method")]
    pub method: ChunkingMethod,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enable: false,
            method: default_chunking_method(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

fn default_chunking_method() -> ChunkingMethod {
    ChunkingMethod::Simple
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_min_chunk_size() -> usize {
    100
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SinksConfig {
    /// Which sinks run, from {parquet, search, graph}.
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub parquet: ParquetSinkConfig,
    #[serde(default)]
    pub search: SearchSinkConfig,
    #[serde(default)]
    pub graph: GraphSinkConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    Snappy,
    Zstd,
    Gzip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Overwrite,
    Append,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParquetSinkConfig {
    #[serde(default = "default_parquet_path")]
    pub path: String,
    #[serde(default)]
    pub partition_by: Vec<String>,
    #[serde(default = "default_compression")]
    pub compression: ParquetCompression,
    #[serde(default = "default_write_mode")]
    pub mode: WriteMode,
}

impl Default for ParquetSinkConfig {
    fn default() -> Self {
        Self {
            path: default_parquet_path(),
            partition_by: Vec::new(),
            compression: default_compression(),
            mode: default_write_mode(),
        }
    }
}

fn default_parquet_path() -> String {
    "output/parquet".to_string()
}
fn default_compression() -> ParquetCompression {
    ParquetCompression::Snappy
}
fn default_write_mode() -> WriteMode {
    WriteMode::Overwrite
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchSinkConfig {
    #[serde(default = "default_search_hosts")]
    pub hosts: Vec<String>,
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    #[serde(default)]
    pub username: Option<String>,
    /// Field names dropped from every document before indexing.
    #[serde(default)]
    pub excluded_fields: Vec<String>,
}

impl Default for SearchSinkConfig {
    fn default() -> Self {
        Self {
            hosts: default_search_hosts(),
            index_prefix: default_index_prefix(),
            bulk_size: default_bulk_size(),
            username: None,
            excluded_fields: Vec::new(),
        }
    }
}

fn default_search_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}
fn default_index_prefix() -> String {
    "atlas".to_string()
}
fn default_bulk_size() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphSinkConfig {
    #[serde(default = "default_graph_url")]
    pub url: String,
    #[serde(default = "default_graph_username")]
    pub username: String,
    #[serde(default = "default_graph_batch_size")]
    pub batch_size: usize,
}

impl Default for GraphSinkConfig {
    fn default() -> Self {
        Self {
            url: default_graph_url(),
            username: default_graph_username(),
            batch_size: default_graph_batch_size(),
        }
    }
}

fn default_graph_url() -> String {
    "http://localhost:7474/db/neo4j/tx/commit".to_string()
}
fn default_graph_username() -> String {
    "neo4j".to_string()
}
fn default_graph_batch_size() -> usize {
    500
}

const KNOWN_SINKS: &[&str] = &["parquet", "search", "graph"];

impl PipelineConfig {
    /// Load configuration from a TOML file, substituting `${VAR}`
    /// placeholders from the environment before deserialization.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut value: toml::Value = toml::from_str(raw)?;
        substitute_env_vars(&mut value);
        let config: PipelineConfig = value
            .try_into()
            .map_err(|e: toml::de::Error| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.parallelism == 0 {
            return Err(PipelineError::Config(
                "run.parallelism must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(PipelineError::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(PipelineError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        for sink in &self.sinks.enabled {
            if !KNOWN_SINKS.contains(&sink.as_str()) {
                return Err(PipelineError::Config(format!(
                    "unknown sink '{}' (expected one of {:?})",
                    sink, KNOWN_SINKS
                )));
            }
        }
        for (name, path) in [
            ("sources.properties", &self.sources.properties),
            ("sources.neighborhoods", &self.sources.neighborhoods),
            ("sources.wikipedia_db", &self.sources.wikipedia_db),
            ("sources.locations", &self.sources.locations),
        ] {
            if path.trim().is_empty() {
                return Err(PipelineError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn sink_enabled(&self, name: &str) -> bool {
        self.sinks.enabled.iter().any(|s| s == name)
    }
}

/// Recursively substitute `${VAR_NAME}` placeholders in string values.
/// Unknown variables keep the placeholder so the problem is visible
/// downstream instead of silently becoming an empty string.
fn substitute_env_vars(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) => {
            if !s.contains("${") {
                return;
            }
            let mut replaced = s.clone();
            for caps in ENV_VAR_PATTERN.captures_iter(s) {
                let var_name = &caps[1];
                match std::env::var(var_name) {
                    Ok(env_value) => {
                        replaced = replaced.replace(&format!("${{{var_name}}}"), &env_value);
                    }
                    Err(_) => {
                        warn!("environment variable {} not found, keeping placeholder", var_name);
                    }
                }
            }
            *s = replaced;
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_env_vars(v);
            }
        }
        toml::Value::Array(items) => {
            for v in items.iter_mut() {
                substitute_env_vars(v);
            }
        }
        _ => {}
    }
}
