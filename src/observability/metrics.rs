//! Metric catalog for the pipeline.
//!
//! Provides a typed API over the `metrics` facade using standard
//! Prometheus naming conventions. Names live in one enum so call sites
//! never carry magic strings.

use std::fmt;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Source reader metrics
    SourcesRowsRead,
    SourcesRowsCorrupt,
    SourcesReadErrors,

    // Tier processor metrics
    TierRecordsProcessed,
    TierRecordsLowQuality,
    TierQualityScore,
    TierStageDuration,

    // Enrichment metrics
    EnrichmentRecordsMatched,
    EnrichmentRecordsUnmatched,
    EnrichmentProjectionsSkipped,

    // Embedding engine metrics
    EmbeddingNodesTotal,
    EmbeddingNodesEmbedded,
    EmbeddingNodesFailed,
    EmbeddingRetries,
    EmbeddingBatchDuration,

    // Sink metrics
    SinkRecordsWritten,
    SinkWriteErrors,
    SinkWriteDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricName::SourcesRowsRead => "atlas_sources_rows_read_total",
            MetricName::SourcesRowsCorrupt => "atlas_sources_rows_corrupt_total",
            MetricName::SourcesReadErrors => "atlas_sources_read_errors_total",

            MetricName::TierRecordsProcessed => "atlas_tier_records_processed_total",
            MetricName::TierRecordsLowQuality => "atlas_tier_records_low_quality_total",
            MetricName::TierQualityScore => "atlas_tier_quality_score",
            MetricName::TierStageDuration => "atlas_tier_stage_duration_seconds",

            MetricName::EnrichmentRecordsMatched => "atlas_enrichment_records_matched_total",
            MetricName::EnrichmentRecordsUnmatched => "atlas_enrichment_records_unmatched_total",
            MetricName::EnrichmentProjectionsSkipped => "atlas_enrichment_projections_skipped_total",

            MetricName::EmbeddingNodesTotal => "atlas_embedding_nodes_total",
            MetricName::EmbeddingNodesEmbedded => "atlas_embedding_nodes_embedded_total",
            MetricName::EmbeddingNodesFailed => "atlas_embedding_nodes_failed_total",
            MetricName::EmbeddingRetries => "atlas_embedding_retries_total",
            MetricName::EmbeddingBatchDuration => "atlas_embedding_batch_duration_seconds",

            MetricName::SinkRecordsWritten => "atlas_sink_records_written_total",
            MetricName::SinkWriteErrors => "atlas_sink_write_errors_total",
            MetricName::SinkWriteDuration => "atlas_sink_write_duration_seconds",
        };
        f.write_str(name)
    }
}

pub mod sources {
    use super::MetricName;

    pub fn rows_read(entity: &str, count: u64) {
        metrics::counter!(MetricName::SourcesRowsRead.to_string(), "entity" => entity.to_string())
            .increment(count);
    }

    pub fn rows_corrupt(entity: &str, count: u64) {
        metrics::counter!(MetricName::SourcesRowsCorrupt.to_string(), "entity" => entity.to_string())
            .increment(count);
    }

    pub fn read_error(entity: &str) {
        metrics::counter!(MetricName::SourcesReadErrors.to_string(), "entity" => entity.to_string())
            .increment(1);
    }
}

pub mod tiers {
    use super::MetricName;

    pub fn records_processed(entity: &str, tier: &str, count: u64) {
        metrics::counter!(
            MetricName::TierRecordsProcessed.to_string(),
            "entity" => entity.to_string(),
            "tier" => tier.to_string()
        )
        .increment(count);
    }

    pub fn records_low_quality(entity: &str, count: u64) {
        metrics::counter!(MetricName::TierRecordsLowQuality.to_string(), "entity" => entity.to_string())
            .increment(count);
    }

    pub fn quality_score(entity: &str, score: f64) {
        metrics::histogram!(MetricName::TierQualityScore.to_string(), "entity" => entity.to_string())
            .record(score);
    }

    pub fn stage_duration(entity: &str, tier: &str, seconds: f64) {
        metrics::histogram!(
            MetricName::TierStageDuration.to_string(),
            "entity" => entity.to_string(),
            "tier" => tier.to_string()
        )
        .record(seconds);
    }
}

pub mod enrichment {
    use super::MetricName;

    pub fn records_matched(projection: &str, count: u64) {
        metrics::counter!(
            MetricName::EnrichmentRecordsMatched.to_string(),
            "projection" => projection.to_string()
        )
        .increment(count);
    }

    pub fn records_unmatched(projection: &str, count: u64) {
        metrics::counter!(
            MetricName::EnrichmentRecordsUnmatched.to_string(),
            "projection" => projection.to_string()
        )
        .increment(count);
    }

    pub fn projection_skipped(projection: &str) {
        metrics::counter!(
            MetricName::EnrichmentProjectionsSkipped.to_string(),
            "projection" => projection.to_string()
        )
        .increment(1);
    }
}

pub mod embedding {
    use super::MetricName;

    pub fn nodes_total(entity: &str, count: u64) {
        metrics::counter!(MetricName::EmbeddingNodesTotal.to_string(), "entity" => entity.to_string())
            .increment(count);
    }

    pub fn nodes_embedded(entity: &str, count: u64) {
        metrics::counter!(MetricName::EmbeddingNodesEmbedded.to_string(), "entity" => entity.to_string())
            .increment(count);
    }

    pub fn nodes_failed(entity: &str, count: u64) {
        metrics::counter!(MetricName::EmbeddingNodesFailed.to_string(), "entity" => entity.to_string())
            .increment(count);
    }

    pub fn retry(provider: &str) {
        metrics::counter!(MetricName::EmbeddingRetries.to_string(), "provider" => provider.to_string())
            .increment(1);
    }

    pub fn batch_duration(provider: &str, seconds: f64) {
        metrics::histogram!(
            MetricName::EmbeddingBatchDuration.to_string(),
            "provider" => provider.to_string()
        )
        .record(seconds);
    }
}

pub mod sinks {
    use super::MetricName;

    pub fn records_written(sink: &str, count: u64) {
        metrics::counter!(MetricName::SinkRecordsWritten.to_string(), "sink" => sink.to_string())
            .increment(count);
    }

    pub fn write_error(sink: &str) {
        metrics::counter!(MetricName::SinkWriteErrors.to_string(), "sink" => sink.to_string())
            .increment(1);
    }

    pub fn write_duration(sink: &str, seconds: f64) {
        metrics::histogram!(MetricName::SinkWriteDuration.to_string(), "sink" => sink.to_string())
            .record(seconds);
    }
}
