use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::{ParquetCompression as CompressionConfig, ParquetSinkConfig, WriteMode};
use crate::domain::EntityType;
use crate::observability::metrics;

use super::{SinkDocument, SinkWriter, WriteResult};

/// Columnar file sink: writes each entity's documents as a partitioned
/// parquet dataset under `{path}/{entity}/[key=value/...]`.
pub struct ParquetSink {
    config: ParquetSinkConfig,
}

impl ParquetSink {
    pub fn new(config: ParquetSinkConfig) -> Self {
        Self { config }
    }

    fn compression(&self) -> ParquetCompression {
        match self.config.compression {
            CompressionConfig::Snappy => ParquetCompression::Snappy,
            CompressionConfig::Zstd => ParquetCompression::Zstd(None),
            CompressionConfig::Gzip => ParquetCompression::Gzip(None),
        }
    }

    fn dataset_dir(&self, entity: EntityType) -> PathBuf {
        Path::new(&self.config.path).join(entity.as_str())
    }

    fn write_inner(&self, entity: EntityType, documents: &[SinkDocument]) -> PolarsResult<usize> {
        let dir = self.dataset_dir(entity);
        if self.config.mode == WriteMode::Overwrite && dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| PolarsError::IO {
                error: e.into(),
                msg: None,
            })?;
        }

        if documents.is_empty() {
            // Zero rows is a valid dataset: just materialize the directory.
            std::fs::create_dir_all(&dir).map_err(|e| PolarsError::IO {
                error: e.into(),
                msg: None,
            })?;
            return Ok(0);
        }

        // JSON-lines round trip keeps nested arrays and structs lossless.
        let mut buffer = Vec::with_capacity(documents.len() * 256);
        for document in documents {
            serde_json::to_writer(&mut buffer, &document.body)
                .map_err(|e| PolarsError::ComputeError(e.to_string().into()))?;
            buffer.push(b'\n');
        }
        let df = JsonReader::new(Cursor::new(buffer))
            .with_json_format(JsonFormat::JsonLines)
            .finish()?;

        let partition_keys: Vec<&str> = self
            .config
            .partition_by
            .iter()
            .map(|s| s.as_str())
            .filter(|key| df.get_column_names().iter().any(|c| c.as_str() == *key))
            .collect();
        if partition_keys.len() < self.config.partition_by.len() {
            warn!(
                requested = ?self.config.partition_by,
                usable = ?partition_keys,
                "some partition keys are absent from the dataset"
            );
        }

        let total = df.height();
        if partition_keys.is_empty() {
            self.write_part(&dir, df)?;
        } else {
            let parts = df.partition_by_stable(partition_keys.clone(), true)?;
            for part in parts {
                let mut part_dir = dir.clone();
                for key in &partition_keys {
                    let value = partition_value(&part, key)?;
                    part_dir = part_dir.join(format!("{key}={value}"));
                }
                self.write_part(&part_dir, part)?;
            }
        }
        Ok(total)
    }

    fn write_part(&self, dir: &Path, mut df: DataFrame) -> PolarsResult<()> {
        std::fs::create_dir_all(dir).map_err(|e| PolarsError::IO {
            error: e.into(),
            msg: None,
        })?;
        let file_name = match self.config.mode {
            WriteMode::Overwrite => "part-00000.parquet".to_string(),
            WriteMode::Append => format!("part-{}.parquet", uuid::Uuid::new_v4().simple()),
        };
        let file = std::fs::File::create(dir.join(file_name)).map_err(|e| PolarsError::IO {
            error: e.into(),
            msg: None,
        })?;
        ParquetWriter::new(file)
            .with_compression(self.compression())
            .finish(&mut df)?;
        Ok(())
    }
}

fn partition_value(df: &DataFrame, key: &str) -> PolarsResult<String> {
    let value = df.column(key)?.get(0)?;
    Ok(match value {
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Null => "__null__".to_string(),
        other => other.to_string(),
    })
}

#[async_trait]
impl SinkWriter for ParquetSink {
    fn name(&self) -> &'static str {
        "parquet"
    }

    async fn write(&self, entity: EntityType, documents: &[SinkDocument]) -> WriteResult {
        let started = std::time::Instant::now();
        let result = self.write_inner(entity, documents);
        metrics::sinks::write_duration("parquet", started.elapsed().as_secs_f64());
        match result {
            Ok(count) => {
                metrics::sinks::records_written("parquet", count as u64);
                info!(entity = %entity, rows = count, path = %self.config.path, "parquet dataset written");
                WriteResult::ok("parquet", entity.as_str(), count)
            }
            Err(e) => {
                metrics::sinks::write_error("parquet");
                warn!(entity = %entity, error = %e, "parquet write failed");
                WriteResult::failed("parquet", entity.as_str(), e.to_string())
            }
        }
    }
}
