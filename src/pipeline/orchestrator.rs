use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::domain::{
    EntityType, NeighborhoodGoldRow, PropertyGoldRow, Tier, WikipediaGoldRow,
};
use crate::embeddings::{EmbeddingEngine, ProviderFactory};
use crate::enrich::EnrichedPropertyRow;
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::report::{EntityMetrics, QualityDistribution};
use crate::sinks::{documents_from_rows, SinkDocument, SinkWriter, WriteResult};
use crate::sources::{NeighborhoodReader, PropertyReader, ReadStats, WikipediaReader};
use crate::store::{TableName, TableStore};
use crate::tiers::bronze::to_bronze;
use crate::tiers::gold::{
    LocationDirectory, NeighborhoodGoldProcessor, PropertyGoldProcessor, WikipediaGoldProcessor,
};
use crate::tiers::silver::{
    LocationLookup, NeighborhoodSilverProcessor, PropertySilverProcessor,
    WikipediaSilverProcessor,
};

/// Stages of one entity's pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Bronze,
    Silver,
    Gold,
    Enrichment,
    Embedding,
    Sinks,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Bronze => "bronze",
            Stage::Silver => "silver",
            Stage::Gold => "gold",
            Stage::Enrichment => "enrichment",
            Stage::Embedding => "embedding",
            Stage::Sinks => "sinks",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator status: running some stage, finished, or halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    Running(Stage),
    Done,
    Failed { stage: Stage, cause: String },
}

/// Lineage record emitted once per materialized table.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedTable {
    pub name: String,
    pub entity: EntityType,
    pub tier: String,
    pub record_count: usize,
    pub run_timestamp: DateTime<Utc>,
}

/// Shared collaborators handed down from the runner. No process-wide
/// state: everything a stage needs arrives through this value.
pub struct Collaborators {
    pub store: Arc<TableStore>,
    pub config: Arc<PipelineConfig>,
    pub lookup: Arc<LocationLookup>,
    pub directory: Arc<LocationDirectory>,
    pub provider_factory: ProviderFactory,
    pub cancel: watch::Receiver<bool>,
    pub run_id: u64,
}

/// Drives one entity through bronze → silver → gold → embedding →
/// sinks. A stage failure halts this orchestrator only; the runner
/// decides whether siblings continue.
pub struct EntityOrchestrator {
    entity: EntityType,
    collaborators: Arc<Collaborators>,
    state: OrchestratorState,
    pub metrics: EntityMetrics,
    pub lineage: Vec<ProcessedTable>,
    pub degraded: bool,
}

impl EntityOrchestrator {
    pub fn new(entity: EntityType, collaborators: Arc<Collaborators>) -> Self {
        Self {
            entity,
            collaborators,
            state: OrchestratorState::Running(Stage::Init),
            metrics: EntityMetrics::default(),
            lineage: Vec::new(),
            degraded: false,
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state, OrchestratorState::Failed { .. })
    }

    fn run_id(&self) -> u64 {
        self.collaborators.run_id
    }

    fn check_cancel(&self) -> Result<()> {
        if *self.collaborators.cancel.borrow() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter(&mut self, stage: Stage) -> Result<()> {
        self.check_cancel()?;
        info!(entity = %self.entity, stage = %stage, "stage transition");
        self.state = OrchestratorState::Running(stage);
        Ok(())
    }

    fn record_duration(&mut self, stage: Stage, started: Instant) {
        let elapsed = started.elapsed();
        self.metrics
            .stage_durations_ms
            .insert(stage.as_str().to_string(), elapsed.as_millis() as u64);
        metrics::tiers::stage_duration(self.entity.as_str(), stage.as_str(), elapsed.as_secs_f64());
    }

    fn emit_table(&mut self, name: &TableName, tier: &str, record_count: usize) {
        self.lineage.push(ProcessedTable {
            name: name.as_str().to_string(),
            entity: self.entity,
            tier: tier.to_string(),
            record_count,
            run_timestamp: Utc::now(),
        });
    }

    pub fn note_stage_duration(&mut self, stage: Stage, ms: u64) {
        self.metrics
            .stage_durations_ms
            .insert(stage.as_str().to_string(), ms);
    }

    fn fail(&mut self, stage: Stage, error: &PipelineError) {
        warn!(entity = %self.entity, stage = %stage, error = %error, "stage failed, halting orchestrator");
        self.state = OrchestratorState::Failed {
            stage,
            cause: error.to_string(),
        };
    }

    /// Mark this orchestrator as halted before it ran (stop_on_error).
    pub fn mark_skipped(&mut self, cause: impl Into<String>) {
        self.state = OrchestratorState::Failed {
            stage: Stage::Init,
            cause: cause.into(),
        };
    }

    fn current_stage(&self) -> Stage {
        match &self.state {
            OrchestratorState::Running(stage) => *stage,
            OrchestratorState::Done => Stage::Done,
            OrchestratorState::Failed { stage, .. } => *stage,
        }
    }

    /// Bronze → Silver → Gold for this entity.
    pub async fn advance_to_gold(&mut self) -> Result<()> {
        let result = match self.entity {
            EntityType::Property => self.property_to_gold().await,
            EntityType::Neighborhood => self.neighborhood_to_gold().await,
            EntityType::Wikipedia => self.wikipedia_to_gold().await,
        };
        if let Err(e) = &result {
            self.fail(self.current_stage(), e);
        }
        result
    }

    async fn property_to_gold(&mut self) -> Result<()> {
        let collaborators = self.collaborators.clone();
        let config = &collaborators.config;
        let sample = config.run.sample_size;

        self.enter(Stage::Bronze)?;
        let started = Instant::now();
        let source_path = Path::new(&config.sources.properties);
        let (outcomes, stats) = PropertyReader::read(source_path, sample)?;
        self.note_read(&stats);
        let bronze_name = TableName::tiered(self.entity, Tier::Bronze, self.run_id());
        let bronze_rows = to_bronze(self.entity, &bronze_name, outcomes, &stats.source_path, Utc::now())?;
        let bronze_rows = collaborators.store.create(&bronze_name, bronze_rows)?;
        self.metrics.bronze_records = bronze_rows.len();
        self.emit_table(&bronze_name, "bronze", bronze_rows.len());
        self.record_duration(Stage::Bronze, started);

        self.enter(Stage::Silver)?;
        let started = Instant::now();
        let processor = PropertySilverProcessor::new(collaborators.lookup.clone());
        let silver_rows = processor.process(&bronze_rows, Utc::now());
        self.metrics.quality_distribution =
            QualityDistribution::from_scores(silver_rows.iter().map(|r| r.data_quality_score));
        let silver_name = TableName::tiered(self.entity, Tier::Silver, self.run_id());
        let silver_rows = collaborators.store.create(&silver_name, silver_rows)?;
        self.metrics.silver_records = silver_rows.len();
        self.emit_table(&silver_name, "silver", silver_rows.len());
        self.record_duration(Stage::Silver, started);

        self.enter(Stage::Gold)?;
        let started = Instant::now();
        // Property gold links against the neighborhood gold table; the
        // runner sequences property last so it is normally present.
        let neighborhood_gold = collaborators
            .store
            .rows::<NeighborhoodGoldRow>(&TableName::tiered(
                EntityType::Neighborhood,
                Tier::Gold,
                self.run_id(),
            ))
            .unwrap_or_else(|_| {
                warn!("neighborhood gold table unavailable, property links limited to explicit ids");
                Arc::new(Vec::new())
            });
        let processor = PropertyGoldProcessor::new(&collaborators.directory, &neighborhood_gold);
        let gold_rows = processor.process(&silver_rows);
        let gold_name = TableName::tiered(self.entity, Tier::Gold, self.run_id());
        let gold_rows = collaborators.store.create(&gold_name, gold_rows)?;
        self.metrics.gold_records = gold_rows.len();
        self.emit_table(&gold_name, "gold", gold_rows.len());
        self.record_duration(Stage::Gold, started);
        Ok(())
    }

    async fn neighborhood_to_gold(&mut self) -> Result<()> {
        let collaborators = self.collaborators.clone();
        let config = &collaborators.config;
        let sample = config.run.sample_size;

        self.enter(Stage::Bronze)?;
        let started = Instant::now();
        let source_path = Path::new(&config.sources.neighborhoods);
        let (outcomes, stats) = NeighborhoodReader::read(source_path, sample)?;
        self.note_read(&stats);
        let bronze_name = TableName::tiered(self.entity, Tier::Bronze, self.run_id());
        let bronze_rows = to_bronze(self.entity, &bronze_name, outcomes, &stats.source_path, Utc::now())?;
        let bronze_rows = collaborators.store.create(&bronze_name, bronze_rows)?;
        self.metrics.bronze_records = bronze_rows.len();
        self.emit_table(&bronze_name, "bronze", bronze_rows.len());
        self.record_duration(Stage::Bronze, started);

        self.enter(Stage::Silver)?;
        let started = Instant::now();
        let processor = NeighborhoodSilverProcessor::new(collaborators.lookup.clone());
        let silver_rows = processor.process(&bronze_rows, Utc::now());
        self.metrics.quality_distribution =
            QualityDistribution::from_scores(silver_rows.iter().map(|r| r.data_quality_score));
        let silver_name = TableName::tiered(self.entity, Tier::Silver, self.run_id());
        let silver_rows = collaborators.store.create(&silver_name, silver_rows)?;
        self.metrics.silver_records = silver_rows.len();
        self.emit_table(&silver_name, "silver", silver_rows.len());
        self.record_duration(Stage::Silver, started);

        self.enter(Stage::Gold)?;
        let started = Instant::now();
        let processor = NeighborhoodGoldProcessor::new(&collaborators.directory);
        let gold_rows = processor.process(&silver_rows);
        let gold_name = TableName::tiered(self.entity, Tier::Gold, self.run_id());
        let gold_rows = collaborators.store.create(&gold_name, gold_rows)?;
        self.metrics.gold_records = gold_rows.len();
        self.emit_table(&gold_name, "gold", gold_rows.len());
        self.record_duration(Stage::Gold, started);
        Ok(())
    }

    async fn wikipedia_to_gold(&mut self) -> Result<()> {
        let collaborators = self.collaborators.clone();
        let config = &collaborators.config;
        let sample = config.run.sample_size;

        self.enter(Stage::Bronze)?;
        let started = Instant::now();
        let source_path = Path::new(&config.sources.wikipedia_db);
        let (outcomes, stats) = WikipediaReader::read(source_path, sample)?;
        self.note_read(&stats);
        let bronze_name = TableName::tiered(self.entity, Tier::Bronze, self.run_id());
        let bronze_rows = to_bronze(self.entity, &bronze_name, outcomes, &stats.source_path, Utc::now())?;
        let bronze_rows = collaborators.store.create(&bronze_name, bronze_rows)?;
        self.metrics.bronze_records = bronze_rows.len();
        self.emit_table(&bronze_name, "bronze", bronze_rows.len());
        self.record_duration(Stage::Bronze, started);

        self.enter(Stage::Silver)?;
        let started = Instant::now();
        let processor = WikipediaSilverProcessor::new(collaborators.lookup.clone());
        let silver_rows = processor.process(&bronze_rows, Utc::now());
        self.metrics.quality_distribution =
            QualityDistribution::from_scores(silver_rows.iter().map(|r| r.data_quality_score));
        let silver_name = TableName::tiered(self.entity, Tier::Silver, self.run_id());
        let silver_rows = collaborators.store.create(&silver_name, silver_rows)?;
        self.metrics.silver_records = silver_rows.len();
        self.emit_table(&silver_name, "silver", silver_rows.len());
        self.record_duration(Stage::Silver, started);

        self.enter(Stage::Gold)?;
        let started = Instant::now();
        let processor = WikipediaGoldProcessor::new(&collaborators.directory);
        let gold_rows = processor.process(&silver_rows);
        let gold_name = TableName::tiered(self.entity, Tier::Gold, self.run_id());
        let gold_rows = collaborators.store.create(&gold_name, gold_rows)?;
        self.metrics.gold_records = gold_rows.len();
        self.emit_table(&gold_name, "gold", gold_rows.len());
        self.record_duration(Stage::Gold, started);
        Ok(())
    }

    fn note_read(&mut self, stats: &ReadStats) {
        self.metrics.rows_corrupt = stats.rows_corrupt;
    }

    /// Embed the gold table's text column into the sibling embeddings
    /// table. Provider failures degrade the run, never fail it.
    pub async fn run_embedding(&mut self) -> Result<()> {
        if self.has_failed() {
            return Ok(());
        }
        if let Err(e) = self.enter(Stage::Embedding) {
            self.fail(Stage::Embedding, &e);
            return Err(e);
        }
        let started = Instant::now();
        let collaborators = self.collaborators.clone();
        let config = &collaborators.config;

        let texts = match self.gold_texts() {
            Ok(texts) => texts,
            Err(e) => {
                self.fail(Stage::Embedding, &e);
                return Err(e);
            }
        };

        let engine = EmbeddingEngine::new(
            config.embedding.clone(),
            config.chunking.clone(),
            config.run.parallelism,
        );
        let gold_name = TableName::tiered(self.entity, Tier::Gold, self.run_id());
        let (rows, stats) = engine
            .embed(
                self.entity,
                gold_name.as_str(),
                texts,
                collaborators.provider_factory.clone(),
                collaborators.cancel.clone(),
            )
            .await;

        self.metrics.nodes_total = stats.nodes_total;
        self.metrics.embedded_records = stats.nodes_embedded;
        self.metrics.embedding_failed = stats.nodes_failed;
        if stats.degraded {
            self.degraded = true;
        }

        let table_name = TableName::embeddings(self.entity, self.run_id());
        let count = rows.len();
        match collaborators.store.create(&table_name, rows) {
            Ok(_) => {
                self.emit_table(&table_name, "gold_embeddings", count);
                self.record_duration(Stage::Embedding, started);
                Ok(())
            }
            Err(e) => {
                self.fail(Stage::Embedding, &e);
                Err(e)
            }
        }
    }

    fn gold_texts(&self) -> Result<Vec<(String, String)>> {
        let store = &self.collaborators.store;
        let gold_name = TableName::tiered(self.entity, Tier::Gold, self.run_id());
        let texts = match self.entity {
            EntityType::Property => store
                .rows::<PropertyGoldRow>(&gold_name)?
                .iter()
                .map(|row| (row.silver.listing_id.clone(), row.embedding_text.clone()))
                .collect(),
            EntityType::Neighborhood => store
                .rows::<NeighborhoodGoldRow>(&gold_name)?
                .iter()
                .map(|row| (row.silver.neighborhood_id.clone(), row.embedding_text.clone()))
                .collect(),
            EntityType::Wikipedia => store
                .rows::<WikipediaGoldRow>(&gold_name)?
                .iter()
                .map(|row| (row.silver.page_id.to_string(), row.embedding_text.clone()))
                .collect(),
        };
        Ok(texts)
    }

    /// Publish this entity's gold (or enriched) documents to every
    /// enabled sink. Sink failures are recorded, not propagated.
    pub async fn run_sinks(
        &mut self,
        sinks: &[Arc<dyn SinkWriter>],
        enriched_property: Option<Arc<Vec<EnrichedPropertyRow>>>,
    ) -> Vec<WriteResult> {
        if self.has_failed() || sinks.is_empty() {
            if !self.has_failed() {
                self.state = OrchestratorState::Done;
            }
            return Vec::new();
        }
        if self.enter(Stage::Sinks).is_err() {
            return Vec::new();
        }
        let started = Instant::now();

        let documents = match self.sink_documents(enriched_property) {
            Ok(documents) => documents,
            Err(e) => {
                warn!(entity = %self.entity, error = %e, "could not project sink documents");
                return vec![WriteResult::failed("projection", self.entity.as_str(), e.to_string())];
            }
        };

        let mut results = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let result = sink.write(self.entity, &documents).await;
            if result.success {
                self.metrics
                    .sink_records
                    .insert(result.sink.clone(), result.record_count);
            }
            results.push(result);
        }
        self.record_duration(Stage::Sinks, started);
        self.state = OrchestratorState::Done;
        results
    }

    /// The enriched projection supersedes the plain gold table for
    /// properties when it exists; other entities publish gold rows.
    fn sink_documents(
        &self,
        enriched_property: Option<Arc<Vec<EnrichedPropertyRow>>>,
    ) -> Result<Vec<SinkDocument>> {
        let store = &self.collaborators.store;
        let gold_name = TableName::tiered(self.entity, Tier::Gold, self.run_id());
        let documents = match (self.entity, enriched_property) {
            (EntityType::Property, Some(enriched)) => {
                documents_from_rows(self.entity, &enriched)
            }
            (EntityType::Property, None) => {
                documents_from_rows(self.entity, &store.rows::<PropertyGoldRow>(&gold_name)?)
            }
            (EntityType::Neighborhood, _) => {
                documents_from_rows(self.entity, &store.rows::<NeighborhoodGoldRow>(&gold_name)?)
            }
            (EntityType::Wikipedia, _) => {
                documents_from_rows(self.entity, &store.rows::<WikipediaGoldRow>(&gold_name)?)
            }
        };
        Ok(documents)
    }
}
