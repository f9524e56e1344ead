use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source path missing: {0}")]
    SourceMissing(String),

    #[error("Source unparseable: {path}: {reason}")]
    SourceUnparseable { path: String, reason: String },

    #[error("Transform failed for {table}: {reason}")]
    Transform { table: String, reason: String },

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Sink error: {sink}: {reason}")]
    Sink { sink: String, reason: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
