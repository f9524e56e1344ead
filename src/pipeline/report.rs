use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sinks::WriteResult;

/// Bucketed distribution of silver-tier quality scores.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityDistribution {
    /// score >= 0.8
    pub high: usize,
    /// 0.5 <= score < 0.8
    pub medium: usize,
    /// score < 0.5
    pub low: usize,
}

impl QualityDistribution {
    pub fn from_scores(scores: impl IntoIterator<Item = f64>) -> Self {
        let mut distribution = Self::default();
        for score in scores {
            if score >= 0.8 {
                distribution.high += 1;
            } else if score >= 0.5 {
                distribution.medium += 1;
            } else {
                distribution.low += 1;
            }
        }
        distribution
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// Per-entity metrics collected over one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityMetrics {
    pub bronze_records: usize,
    pub silver_records: usize,
    pub gold_records: usize,
    pub rows_corrupt: usize,
    pub nodes_total: usize,
    pub embedded_records: usize,
    pub embedding_failed: usize,
    pub sink_records: BTreeMap<String, usize>,
    pub stage_durations_ms: BTreeMap<String, u64>,
    pub quality_distribution: QualityDistribution,
}

/// A stage that ended an entity orchestrator early.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub entity: String,
    pub stage: String,
    pub cause: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Degraded,
    Failed,
    Cancelled,
}

/// Aggregated outcome of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: BTreeMap<String, EntityMetrics>,
    pub sink_results: Vec<WriteResult>,
    pub failures: Vec<StageFailure>,
    pub degraded: bool,
    pub cancelled: bool,
    pub tables_retained: Vec<String>,
    pub tables_dropped: Vec<String>,
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Cancelled
        } else if !self.failures.is_empty() || self.no_sink_succeeded() {
            RunStatus::Failed
        } else if self.degraded {
            RunStatus::Degraded
        } else {
            RunStatus::Succeeded
        }
    }

    fn sinks_attempted(&self) -> bool {
        !self.sink_results.is_empty()
    }

    fn no_sink_succeeded(&self) -> bool {
        self.sinks_attempted() && self.sink_results.iter().all(|r| !r.success)
    }

    pub fn all_sources_empty(&self) -> bool {
        !self.entities.is_empty() && self.entities.values().all(|m| m.bronze_records == 0)
    }

    /// Process exit code: 0 success (degraded counts as success with
    /// partial artifacts), 1 fatal, 3 all sources empty.
    pub fn exit_code(&self) -> i32 {
        match self.status() {
            RunStatus::Failed | RunStatus::Cancelled => 1,
            _ if self.all_sources_empty() => 3,
            _ => 0,
        }
    }

    /// Human-readable end-of-run summary printed by the CLI.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Run {} finished in {}ms with status {:?}\n",
            self.run_id,
            (self.finished_at - self.started_at).num_milliseconds(),
            self.status()
        ));
        for (entity, metrics) in &self.entities {
            out.push_str(&format!(
                "  {entity}: bronze={} silver={} gold={} corrupt={} embedded={}/{}\n",
                metrics.bronze_records,
                metrics.silver_records,
                metrics.gold_records,
                metrics.rows_corrupt,
                metrics.embedded_records,
                metrics.nodes_total,
            ));
            let quality = &metrics.quality_distribution;
            if quality.total() > 0 {
                out.push_str(&format!(
                    "    quality: high={} medium={} low={}\n",
                    quality.high, quality.medium, quality.low
                ));
            }
        }
        if !self.sink_results.is_empty() {
            out.push_str("  sinks:\n");
            for result in &self.sink_results {
                match (&result.success, &result.error) {
                    (true, _) => out.push_str(&format!(
                        "    {} [{}]: {} records\n",
                        result.sink, result.entity, result.record_count
                    )),
                    (false, error) => out.push_str(&format!(
                        "    {} [{}]: FAILED ({})\n",
                        result.sink,
                        result.entity,
                        error.as_deref().unwrap_or("unknown")
                    )),
                }
            }
        }
        for failure in &self.failures {
            out.push_str(&format!(
                "  FAILED {} at {}: {}\n",
                failure.entity, failure.stage, failure.cause
            ));
        }
        if !self.tables_retained.is_empty() {
            out.push_str(&format!("  tables retained: {}\n", self.tables_retained.join(", ")));
        }
        out
    }
}
