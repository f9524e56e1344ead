use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::domain::{EntityType, Tier};
use crate::embeddings::create_provider_factory;
use crate::enrich::{
    CrossEntityEnricher, EnrichedPropertyRow, NeighborhoodWikiRow, PropertyWikiRow,
};
use crate::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::sinks::{GraphSink, ParquetSink, SearchSink, SinkWriter, WriteResult};
use crate::sinks::graph::GraphEdge;
use crate::sources::LocationReader;
use crate::store::{TableName, TableStore};
use crate::tiers::gold::LocationDirectory;
use crate::tiers::silver::LocationLookup;

use super::orchestrator::{Collaborators, EntityOrchestrator, OrchestratorState, Stage};
use super::report::{RunReport, StageFailure};

type OrchestratorFactory = Box<dyn Fn(Arc<Collaborators>) -> EntityOrchestrator + Send + Sync>;

/// Maps entity types to orchestrator factories. Built locally at
/// startup; there is no process-wide registry.
pub struct PipelineRegistry {
    factories: HashMap<EntityType, OrchestratorFactory>,
}

impl PipelineRegistry {
    pub fn standard() -> Self {
        let mut factories: HashMap<EntityType, OrchestratorFactory> = HashMap::new();
        for entity in EntityType::all() {
            factories.insert(
                entity,
                Box::new(move |collaborators| EntityOrchestrator::new(entity, collaborators)),
            );
        }
        Self { factories }
    }

    pub fn resolve(
        &self,
        entity: EntityType,
        collaborators: Arc<Collaborators>,
    ) -> Result<EntityOrchestrator> {
        let factory = self.factories.get(&entity).ok_or_else(|| {
            PipelineError::Config(format!("no orchestrator registered for entity '{entity}'"))
        })?;
        Ok(factory(collaborators))
    }
}

/// Top-level runner: creates the shared store and run namespace, runs
/// per-entity orchestrators in dependency order (property last), then
/// cross-entity enrichment, embeddings and sinks, and aggregates the
/// run report.
pub struct PipelineRunner {
    config: Arc<PipelineConfig>,
    registry: PipelineRegistry,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            config: Arc::new(config),
            registry: PipelineRegistry::standard(),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// Handle for external cancellation (ctrl-c). Sending `true` makes
    /// readers stop at record boundaries and workers drain.
    pub fn cancel_handle(&self) -> Arc<watch::Sender<bool>> {
        self.cancel_tx.clone()
    }

    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = started_at.timestamp() as u64;
        info!(run_id, "pipeline run starting");

        let store = Arc::new(TableStore::new());
        let lookup = Arc::new(LocationLookup::from_config(&self.config.enrichment));
        let directory = Arc::new(self.load_location_directory());
        let provider_factory = create_provider_factory(&self.config.embedding)?;

        let collaborators = Arc::new(Collaborators {
            store: store.clone(),
            config: self.config.clone(),
            lookup,
            directory,
            provider_factory,
            cancel: self.cancel_rx.clone(),
            run_id,
        });

        // Neighborhood and wikipedia race to gold; property runs last so
        // its gold stage and the enricher can see their tables.
        let mut neighborhood =
            self.registry.resolve(EntityType::Neighborhood, collaborators.clone())?;
        let mut wikipedia = self.registry.resolve(EntityType::Wikipedia, collaborators.clone())?;
        let neighborhood_task = tokio::spawn(async move {
            let _ = neighborhood.advance_to_gold().await;
            neighborhood
        });
        let wikipedia_task = tokio::spawn(async move {
            let _ = wikipedia.advance_to_gold().await;
            wikipedia
        });
        let (neighborhood, wikipedia) = tokio::join!(neighborhood_task, wikipedia_task);
        let neighborhood = neighborhood.map_err(|e| PipelineError::Transform {
            table: "neighborhood".to_string(),
            reason: format!("orchestrator task panicked: {e}"),
        })?;
        let wikipedia = wikipedia.map_err(|e| PipelineError::Transform {
            table: "wikipedia".to_string(),
            reason: format!("orchestrator task panicked: {e}"),
        })?;

        let mut orchestrators = vec![neighborhood, wikipedia];
        let stop_early = self.config.run.stop_on_error
            && orchestrators.iter().any(EntityOrchestrator::has_failed);
        let mut property = self.registry.resolve(EntityType::Property, collaborators.clone())?;
        if stop_early {
            warn!("stop_on_error set and an entity failed; skipping remaining entities");
            property.mark_skipped("skipped: sibling entity failed with stop_on_error set");
        } else {
            let _ = property.advance_to_gold().await;
        }
        orchestrators.insert(0, property);

        // Cross-entity enrichment once every entity is at gold.
        let enrichment_started = std::time::Instant::now();
        let enriched_property = self.run_enrichment(&collaborators);
        if let Some(property_orchestrator) = orchestrators
            .iter_mut()
            .find(|o| o.entity() == EntityType::Property)
        {
            property_orchestrator.note_stage_duration(
                Stage::Enrichment,
                enrichment_started.elapsed().as_millis() as u64,
            );
        }

        // Embedding per entity, in parallel across entities.
        let mut embedding_tasks = Vec::new();
        for mut orchestrator in orchestrators {
            embedding_tasks.push(tokio::spawn(async move {
                let _ = orchestrator.run_embedding().await;
                orchestrator
            }));
        }
        let mut orchestrators = Vec::with_capacity(embedding_tasks.len());
        for task in embedding_tasks {
            orchestrators.push(task.await.map_err(|e| PipelineError::Transform {
                table: "embedding".to_string(),
                reason: format!("embedding task panicked: {e}"),
            })?);
        }

        // Sinks.
        let sinks = self.build_sinks().await;
        let mut sink_results: Vec<WriteResult> = Vec::new();
        for orchestrator in orchestrators.iter_mut() {
            let enriched = if orchestrator.entity() == EntityType::Property {
                enriched_property.clone()
            } else {
                None
            };
            sink_results.extend(orchestrator.run_sinks(&sinks, enriched).await);
        }
        if self.config.sink_enabled("graph") {
            let graph = GraphSink::new(self.config.sinks.graph.clone());
            let edges = self.collect_edges(&collaborators);
            if !edges.is_empty() {
                sink_results.push(graph.write_edges(&edges).await);
            }
        }

        // Collect results.
        let mut entities = BTreeMap::new();
        let mut failures = Vec::new();
        let mut degraded = false;
        for orchestrator in &orchestrators {
            entities.insert(
                orchestrator.entity().as_str().to_string(),
                orchestrator.metrics.clone(),
            );
            degraded |= orchestrator.degraded;
            if let OrchestratorState::Failed { stage, cause } = orchestrator.state() {
                failures.push(StageFailure {
                    entity: orchestrator.entity().as_str().to_string(),
                    stage: stage.as_str().to_string(),
                    cause: cause.clone(),
                });
            }
        }
        let cancelled = *self.cancel_rx.borrow();

        // On success drop the intermediate tables; on failure leave the
        // whole namespace in place for inspection.
        let mut tables_dropped = Vec::new();
        if failures.is_empty() && !cancelled {
            for entity in EntityType::all() {
                for tier in [Tier::Bronze, Tier::Silver] {
                    let name = TableName::tiered(entity, tier, run_id);
                    if store.drop_table(&name) {
                        tables_dropped.push(name.as_str().to_string());
                    }
                }
            }
        } else {
            info!("run did not fully succeed; intermediate tables retained for inspection");
        }
        let tables_retained = store.table_names(run_id);

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            entities,
            sink_results,
            failures,
            degraded,
            cancelled,
            tables_retained,
            tables_dropped,
        };
        info!(run_id, status = ?report.status(), "pipeline run finished");
        Ok(report)
    }

    /// The location reference is a dictionary, not an entity: a missing
    /// or malformed file limits hierarchy resolution but never fails
    /// the run.
    fn load_location_directory(&self) -> LocationDirectory {
        let path = Path::new(&self.config.sources.locations);
        match LocationReader::read(path) {
            Ok((entries, _)) => LocationDirectory::from_entries(&entries),
            Err(e) => {
                warn!(error = %e, "location reference unavailable, hierarchy resolution disabled");
                LocationDirectory::default()
            }
        }
    }

    /// Build the three enriched projections. Each projection failure is
    /// logged and skipped; the others proceed.
    fn run_enrichment(
        &self,
        collaborators: &Arc<Collaborators>,
    ) -> Option<Arc<Vec<EnrichedPropertyRow>>> {
        let store = &collaborators.store;
        let run_id = collaborators.run_id;

        let properties = store.rows::<crate::domain::PropertyGoldRow>(&TableName::tiered(
            EntityType::Property,
            Tier::Gold,
            run_id,
        ));
        let neighborhoods = store.rows::<crate::domain::NeighborhoodGoldRow>(&TableName::tiered(
            EntityType::Neighborhood,
            Tier::Gold,
            run_id,
        ));
        let articles = store.rows::<crate::domain::WikipediaGoldRow>(&TableName::tiered(
            EntityType::Wikipedia,
            Tier::Gold,
            run_id,
        ));

        let mut enriched_property = None;
        match (&properties, &neighborhoods) {
            (Ok(properties), Ok(neighborhoods)) => {
                let rows = CrossEntityEnricher::property_neighborhood(properties, neighborhoods);
                let name = TableName::enriched(EntityType::Property, EntityType::Neighborhood, run_id);
                match store.create(&name, rows) {
                    Ok(rows) => enriched_property = Some(rows),
                    Err(e) => {
                        error!(error = %e, "property-neighborhood projection failed");
                        metrics::enrichment::projection_skipped("property_neighborhood");
                    }
                }
            }
            _ => {
                warn!("skipping property-neighborhood projection: gold inputs unavailable");
                metrics::enrichment::projection_skipped("property_neighborhood");
            }
        }

        match (&properties, &articles) {
            (Ok(properties), Ok(articles)) => {
                let rows = CrossEntityEnricher::property_wikipedia(properties, articles);
                let name = TableName::enriched(EntityType::Property, EntityType::Wikipedia, run_id);
                if let Err(e) = store.create(&name, rows) {
                    error!(error = %e, "property-wikipedia projection failed");
                    metrics::enrichment::projection_skipped("property_wikipedia");
                }
            }
            _ => {
                warn!("skipping property-wikipedia projection: gold inputs unavailable");
                metrics::enrichment::projection_skipped("property_wikipedia");
            }
        }

        match (&neighborhoods, &articles) {
            (Ok(neighborhoods), Ok(articles)) => {
                let rows = CrossEntityEnricher::neighborhood_wikipedia(neighborhoods, articles);
                let name =
                    TableName::enriched(EntityType::Neighborhood, EntityType::Wikipedia, run_id);
                if let Err(e) = store.create(&name, rows) {
                    error!(error = %e, "neighborhood-wikipedia projection failed");
                    metrics::enrichment::projection_skipped("neighborhood_wikipedia");
                }
            }
            _ => {
                warn!("skipping neighborhood-wikipedia projection: gold inputs unavailable");
                metrics::enrichment::projection_skipped("neighborhood_wikipedia");
            }
        }

        enriched_property
    }

    /// Construct the enabled sink writers. A failed search-probe makes
    /// the search sink drop out of the run with a recorded failure
    /// rather than failing everything.
    async fn build_sinks(&self) -> Vec<Arc<dyn SinkWriter>> {
        let mut sinks: Vec<Arc<dyn SinkWriter>> = Vec::new();
        if self.config.sink_enabled("parquet") {
            sinks.push(Arc::new(ParquetSink::new(self.config.sinks.parquet.clone())));
        }
        if self.config.sink_enabled("search") {
            let search = SearchSink::new(self.config.sinks.search.clone());
            match search.validate_connection().await {
                Ok(()) => sinks.push(Arc::new(search)),
                Err(e) => {
                    metrics::sinks::write_error("search");
                    error!(error = %e, "search sink connection probe failed, sink disabled for this run");
                }
            }
        }
        if self.config.sink_enabled("graph") {
            sinks.push(Arc::new(GraphSink::new(self.config.sinks.graph.clone())));
        }
        sinks
    }

    /// Relationship edges derived from the enriched projections.
    fn collect_edges(&self, collaborators: &Arc<Collaborators>) -> Vec<GraphEdge> {
        let store = &collaborators.store;
        let run_id = collaborators.run_id;
        let mut edges = Vec::new();

        if let Ok(rows) = store.rows::<EnrichedPropertyRow>(&TableName::enriched(
            EntityType::Property,
            EntityType::Neighborhood,
            run_id,
        )) {
            for row in rows.iter().filter(|r| r.enrichment_success) {
                if let Some(neighborhood_id) = &row.property.neighborhood_id_resolved {
                    edges.push(GraphEdge {
                        from_entity: EntityType::Property,
                        from_id: row.property.silver.listing_id.clone(),
                        to_entity: EntityType::Neighborhood,
                        to_id: neighborhood_id.clone(),
                        relationship: "IN_NEIGHBORHOOD".to_string(),
                        weight: row.property.link_confidence,
                    });
                }
            }
        }

        if let Ok(rows) = store.rows::<PropertyWikiRow>(&TableName::enriched(
            EntityType::Property,
            EntityType::Wikipedia,
            run_id,
        )) {
            for row in rows.iter() {
                for link in &row.wikipedia_articles {
                    edges.push(GraphEdge {
                        from_entity: EntityType::Property,
                        from_id: row.listing_id.clone(),
                        to_entity: EntityType::Wikipedia,
                        to_id: link.page_id.to_string(),
                        relationship: "DESCRIBED_BY".to_string(),
                        weight: link.relevance,
                    });
                }
            }
        }

        if let Ok(rows) = store.rows::<NeighborhoodWikiRow>(&TableName::enriched(
            EntityType::Neighborhood,
            EntityType::Wikipedia,
            run_id,
        )) {
            for row in rows.iter() {
                for link in &row.wikipedia_articles {
                    edges.push(GraphEdge {
                        from_entity: EntityType::Neighborhood,
                        from_id: row.neighborhood_id.clone(),
                        to_entity: EntityType::Wikipedia,
                        to_id: link.page_id.to_string(),
                        relationship: "DESCRIBED_BY".to_string(),
                        weight: link.relevance,
                    });
                }
            }
        }

        edges
    }
}
