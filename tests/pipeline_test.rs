use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use atlas_pipeline::config::{
    EmbeddingConfig, EnrichmentConfig, ParquetSinkConfig, PipelineConfig, ProviderKind, RunConfig,
    SinksConfig, SourcesConfig,
};
use atlas_pipeline::domain::{
    EntityType, NeighborhoodGoldRow, PropertyGoldRow, PropertyRecord, PropertySilverRow, Tier,
    ValidationStatus, WikipediaGoldRow, WikipediaSilverRow,
};
use atlas_pipeline::domain::BronzeRow;
use atlas_pipeline::embeddings::{EmbeddingRow, MockProvider, ProviderFactory};
use atlas_pipeline::enrich::{CrossEntityEnricher, EnrichedPropertyRow};
use atlas_pipeline::pipeline::{Collaborators, EntityOrchestrator, PipelineRunner};
use atlas_pipeline::store::{TableName, TableStore};
use atlas_pipeline::tiers::gold::LocationDirectory;
use atlas_pipeline::tiers::silver::LocationLookup;

const PROPERTIES_JSON: &str = r#"[
    {
        "listing_id": "P1",
        "price": 800000,
        "square_feet": 2000,
        "bedrooms": 3,
        "bathrooms": 2,
        "address": {"city": "SF", "state": "CA"},
        "features": ["Pool", "pool", "Garage"],
        "description": "Bright corner unit close to Dolores Park."
    },
    {
        "listing_id": "P2",
        "price": "NaN"
    },
    {
        "listing_id": "P3",
        "neighborhood_id": "N-unknown",
        "price": 450000,
        "square_feet": 900,
        "address": {"city": "SF", "state": "CA"}
    }
]"#;

const NEIGHBORHOODS_JSON: &str = r#"[
    {
        "neighborhood_id": "N1",
        "name": "Mission",
        "city": "San Francisco",
        "state": "CA",
        "description": "A vibrant district with murals and parks.",
        "amenities": ["Dolores Park", "Wine Bar", "Art Gallery"],
        "characteristics": ["nightlife", "walkable"],
        "demographics": {"population": 45000, "households": 21000, "median_age": 34.2, "median_income": 95000}
    }
]"#;

const LOCATIONS_JSON: &str = r#"[
    {"state": "California", "county": "San Francisco County", "city": "San Francisco", "neighborhood": null},
    {"state": "California", "county": "San Francisco County", "city": "San Francisco", "neighborhood": "Mission"}
]"#;

struct Fixture {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
}

fn write_fixture_sources(dir: &Path) -> SourcesConfig {
    std::fs::write(dir.join("properties.json"), PROPERTIES_JSON).unwrap();
    std::fs::write(dir.join("neighborhoods.json"), NEIGHBORHOODS_JSON).unwrap();
    std::fs::write(dir.join("locations.json"), LOCATIONS_JSON).unwrap();

    let db_path = dir.join("wikipedia.db");
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE articles (
             pageid INTEGER, title TEXT, url TEXT, relevance_score REAL,
             latitude REAL, longitude REAL, categories TEXT
         );
         CREATE TABLE page_summaries (
             page_id INTEGER, short_summary TEXT, long_summary TEXT,
             key_topics TEXT, best_city TEXT, best_state TEXT, confidence_score REAL
         );",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO articles VALUES (42, 'Golden Gate Bridge', 'https://en.wikipedia.org/wiki/GGB',
         0.9, 37.82, -122.48, '[\"Bridges\"]')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO page_summaries VALUES (42, 'A famous bridge.',
         'A suspension bridge spanning the Golden Gate strait, connecting San Francisco to Marin.',
         'bridge, landmark', 'San Francisco', 'CA', 0.85)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO articles VALUES (77, 'Mission District, San Francisco', 'https://en.wikipedia.org/wiki/Mission',
         0.95, 37.76, -122.42, '[\"Neighborhoods\"]')",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO page_summaries VALUES (77, 'A neighborhood in San Francisco.',
         'The Mission District is a neighborhood in San Francisco known for murals and food.',
         'neighborhood, culture', 'San Francisco', 'CA', 0.9)",
        [],
    )
    .unwrap();

    SourcesConfig {
        properties: dir.join("properties.json").to_string_lossy().to_string(),
        neighborhoods: dir.join("neighborhoods.json").to_string_lossy().to_string(),
        wikipedia_db: db_path.to_string_lossy().to_string(),
        locations: dir.join("locations.json").to_string_lossy().to_string(),
    }
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let sources = write_fixture_sources(dir.path());
    let config = PipelineConfig {
        run: RunConfig {
            sample_size: None,
            parallelism: 2,
            stop_on_error: false,
        },
        sources,
        enrichment: EnrichmentConfig::default(),
        embedding: EmbeddingConfig {
            provider: ProviderKind::Mock,
            ..Default::default()
        },
        chunking: Default::default(),
        sinks: SinksConfig::default(),
    };
    Fixture { _dir: dir, config }
}

fn collaborators_for(config: PipelineConfig, factory: ProviderFactory) -> Arc<Collaborators> {
    let (_tx, cancel) = watch::channel(false);
    // Keep the sender alive for the test duration.
    std::mem::forget(_tx);
    let entries = atlas_pipeline::sources::LocationReader::read(Path::new(&config.sources.locations))
        .map(|(entries, _)| entries)
        .unwrap_or_default();
    Arc::new(Collaborators {
        store: Arc::new(TableStore::new()),
        config: Arc::new(config.clone()),
        lookup: Arc::new(LocationLookup::from_config(&config.enrichment)),
        directory: Arc::new(LocationDirectory::from_entries(&entries)),
        provider_factory: factory,
        cancel,
        run_id: 999,
    })
}

fn mock_factory(mock: MockProvider) -> ProviderFactory {
    Arc::new(move || Box::new(mock.clone()))
}

async fn advance_all(collaborators: &Arc<Collaborators>) -> Vec<EntityOrchestrator> {
    let mut orchestrators = Vec::new();
    for entity in [
        EntityType::Neighborhood,
        EntityType::Wikipedia,
        EntityType::Property,
    ] {
        let mut orchestrator = EntityOrchestrator::new(entity, collaborators.clone());
        orchestrator
            .advance_to_gold()
            .await
            .unwrap_or_else(|e| panic!("{entity} failed to reach gold: {e}"));
        orchestrators.push(orchestrator);
    }
    orchestrators
}

#[tokio::test]
async fn test_property_happy_path_through_gold() {
    let fixture = fixture();
    let collaborators = collaborators_for(fixture.config.clone(), mock_factory(MockProvider::new(8)));
    advance_all(&collaborators).await;

    let store = &collaborators.store;
    let silver = store
        .rows::<PropertySilverRow>(&TableName::tiered(EntityType::Property, Tier::Silver, 999))
        .unwrap();
    let p1 = silver.iter().find(|r| r.listing_id == "P1").unwrap();
    assert_eq!(p1.price_per_sqft, Some(400.0));
    assert_eq!(serde_json::to_value(p1.price_category).unwrap(), "high-end");
    assert_eq!(serde_json::to_value(p1.size_category).unwrap(), "medium");
    assert_eq!(p1.city_normalized.as_deref(), Some("San Francisco"));
    assert_eq!(p1.state_normalized.as_deref(), Some("California"));
    assert_eq!(p1.features, vec!["garage", "pool"]);
    assert_eq!(p1.validation_status, ValidationStatus::Validated);

    let gold = store
        .rows::<PropertyGoldRow>(&TableName::tiered(EntityType::Property, Tier::Gold, 999))
        .unwrap();
    let p1_gold = gold.iter().find(|r| r.silver.listing_id == "P1").unwrap();
    // Deterministic correlation identity for the same logical entity.
    assert_eq!(
        p1_gold.correlation_uuid,
        atlas_pipeline::tiers::gold::correlation_uuid(EntityType::Property, "P1")
    );
    assert_eq!(
        p1_gold.county_resolved.as_deref(),
        Some("San Francisco County")
    );
    assert!(p1_gold.embedding_text.contains("Price: 800000"));
}

#[tokio::test]
async fn test_corrupt_row_retained_through_gold() {
    let fixture = fixture();
    let collaborators = collaborators_for(fixture.config.clone(), mock_factory(MockProvider::new(8)));
    advance_all(&collaborators).await;

    let store = &collaborators.store;
    let bronze = store
        .rows::<BronzeRow<PropertyRecord>>(&TableName::tiered(
            EntityType::Property,
            Tier::Bronze,
            999,
        ))
        .unwrap();
    let p2_bronze = bronze
        .iter()
        .find(|r| r.record.listing_id.as_deref() == Some("P2"))
        .unwrap();
    assert!(p2_bronze.corrupt_record.is_some());

    let silver = store
        .rows::<PropertySilverRow>(&TableName::tiered(EntityType::Property, Tier::Silver, 999))
        .unwrap();
    let p2 = silver.iter().find(|r| r.listing_id == "P2").unwrap();
    assert!(p2.data_quality_score < 0.4);
    assert_eq!(p2.validation_status, ValidationStatus::LowQuality);

    let gold = store
        .rows::<PropertyGoldRow>(&TableName::tiered(EntityType::Property, Tier::Gold, 999))
        .unwrap();
    assert!(gold.iter().any(|r| r.silver.listing_id == "P2"));

    // Tier row-count monotonicity: bronze >= silver >= gold.
    assert!(bronze.len() >= silver.len());
    assert!(silver.len() >= gold.len());
}

#[tokio::test]
async fn test_wikipedia_confidence_gate() {
    let fixture = fixture();
    let collaborators = collaborators_for(fixture.config.clone(), mock_factory(MockProvider::new(8)));
    advance_all(&collaborators).await;

    let silver = collaborators
        .store
        .rows::<WikipediaSilverRow>(&TableName::tiered(EntityType::Wikipedia, Tier::Silver, 999))
        .unwrap();
    let bridge = silver.iter().find(|r| r.page_id == 42).unwrap();
    assert!(bridge.has_valid_location);
    assert_eq!(
        serde_json::to_value(bridge.location_specificity).unwrap(),
        "city_and_state"
    );
    let category = serde_json::to_value(bridge.relevance_category).unwrap();
    assert!(category == "relevant" || category == "highly_relevant");
}

#[tokio::test]
async fn test_cross_entity_property_neighborhood_join() {
    let fixture = fixture();
    let collaborators = collaborators_for(fixture.config.clone(), mock_factory(MockProvider::new(8)));
    advance_all(&collaborators).await;

    let store = &collaborators.store;
    let properties = store
        .rows::<PropertyGoldRow>(&TableName::tiered(EntityType::Property, Tier::Gold, 999))
        .unwrap();
    let neighborhoods = store
        .rows::<NeighborhoodGoldRow>(&TableName::tiered(EntityType::Neighborhood, Tier::Gold, 999))
        .unwrap();

    // P1 has no explicit neighborhood_id: best-effort city/state link.
    let p1 = properties.iter().find(|r| r.silver.listing_id == "P1").unwrap();
    assert_eq!(p1.neighborhood_id_resolved.as_deref(), Some("N1"));
    assert!((p1.link_confidence - 0.6).abs() < 1e-9);

    let enriched = CrossEntityEnricher::property_neighborhood(&properties, &neighborhoods);
    let p1_row = enriched
        .iter()
        .find(|r| r.property.silver.listing_id == "P1")
        .unwrap();
    assert!(p1_row.enrichment_success);
    assert_eq!(p1_row.neighborhood_name.as_deref(), Some("Mission"));

    // P3 carries an explicit but unknown id: preserved, unenriched.
    let p3_row = enriched
        .iter()
        .find(|r| r.property.silver.listing_id == "P3")
        .unwrap();
    assert!(!p3_row.enrichment_success);
    assert_eq!(p3_row.neighborhood_name, None);

    // Wikipedia projections.
    let articles = store
        .rows::<WikipediaGoldRow>(&TableName::tiered(EntityType::Wikipedia, Tier::Gold, 999))
        .unwrap();
    let property_wiki = CrossEntityEnricher::property_wikipedia(&properties, &articles);
    let p1_wiki = property_wiki.iter().find(|r| r.listing_id == "P1").unwrap();
    assert!(!p1_wiki.wikipedia_articles.is_empty());
    assert!(p1_wiki.wikipedia_articles.len() <= 3);

    let neighborhood_wiki = CrossEntityEnricher::neighborhood_wikipedia(&neighborhoods, &articles);
    let mission = neighborhood_wiki
        .iter()
        .find(|r| r.neighborhood_id == "N1")
        .unwrap();
    assert_eq!(mission.wikipedia_articles.len(), 1);
    assert_eq!(mission.wikipedia_articles[0].page_id, 77);
}

#[tokio::test]
async fn test_embedding_stage_attaches_vectors() {
    let fixture = fixture();
    let collaborators = collaborators_for(fixture.config.clone(), mock_factory(MockProvider::new(8)));
    let orchestrators = advance_all(&collaborators).await;

    for mut orchestrator in orchestrators {
        orchestrator.run_embedding().await.unwrap();
        let entity = orchestrator.entity();
        let rows = collaborators
            .store
            .rows::<EmbeddingRow>(&TableName::embeddings(entity, 999))
            .unwrap();
        assert!(!rows.is_empty(), "{entity} produced no embedding rows");
        for row in rows.iter() {
            let vector = row.vector.as_ref().expect("mock vectors never fail");
            assert_eq!(vector.len(), row.embedding_dimension);
            assert_eq!(row.embedding_model, "mock_embedding");
        }
    }
}

#[tokio::test]
async fn test_provider_failure_degrades_run_but_completes() {
    let fixture = fixture();
    // Every provider call after the first fails permanently.
    let mock = MockProvider::new(8)
        .fail_on_call(1)
        .fail_on_call(2)
        .fail_on_call(3)
        .fail_on_call(4)
        .fail_on_call(5)
        .fail_on_call(6)
        .fail_on_call(7);
    let mut config = fixture.config.clone();
    config.embedding.batch_size = 1;
    config.embedding.max_retries = 0;
    config.run.parallelism = 1;
    let collaborators = collaborators_for(config, mock_factory(mock));
    let orchestrators = advance_all(&collaborators).await;

    let mut total_nodes = 0usize;
    let mut embedded = 0usize;
    for mut orchestrator in orchestrators {
        orchestrator.run_embedding().await.unwrap();
        total_nodes += orchestrator.metrics.nodes_total;
        embedded += orchestrator.metrics.embedded_records;
    }
    assert!(embedded < total_nodes, "some nodes should have failed");
    assert!(embedded >= 1, "the first call succeeded");
}

#[tokio::test]
async fn test_full_runner_with_parquet_sink() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sources = write_fixture_sources(dir.path());
    let parquet_dir = dir.path().join("parquet");
    let config = PipelineConfig {
        run: RunConfig {
            sample_size: None,
            parallelism: 2,
            stop_on_error: false,
        },
        sources,
        enrichment: EnrichmentConfig::default(),
        embedding: EmbeddingConfig {
            provider: ProviderKind::Mock,
            ..Default::default()
        },
        chunking: Default::default(),
        sinks: SinksConfig {
            enabled: vec!["parquet".to_string()],
            parquet: ParquetSinkConfig {
                path: parquet_dir.to_string_lossy().to_string(),
                ..Default::default()
            },
            ..Default::default()
        },
    };

    let runner = PipelineRunner::new(config);
    let report = runner.run().await?;

    assert_eq!(report.exit_code(), 0, "summary: {}", report.summary());
    let property = &report.entities["property"];
    assert_eq!(property.bronze_records, 3);
    assert_eq!(property.silver_records, 3);
    assert_eq!(property.gold_records, 3);
    assert_eq!(property.rows_corrupt, 1);
    assert!(property.embedded_records > 0);
    assert_eq!(report.entities["neighborhood"].gold_records, 1);
    assert_eq!(report.entities["wikipedia"].gold_records, 2);

    // Sinks ran for all three entities.
    assert!(report.sink_results.iter().all(|r| r.success));
    assert!(parquet_dir.join("property").exists());
    assert!(parquet_dir.join("neighborhood").exists());
    assert!(parquet_dir.join("wikipedia").exists());

    // Intermediate tables dropped, gold/embeddings/enriched retained.
    assert!(report
        .tables_dropped
        .iter()
        .any(|t| t.starts_with("property_bronze")));
    assert!(report.tables_retained.iter().any(|t| t.contains("_gold_")));
    assert!(report
        .tables_retained
        .iter()
        .all(|t| !t.contains("bronze") && !t.contains("silver")));
    Ok(())
}

#[tokio::test]
async fn test_empty_sources_exit_code_three() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("properties.json"), "[]")?;
    std::fs::write(dir.path().join("neighborhoods.json"), "[]")?;
    std::fs::write(dir.path().join("locations.json"), "[]")?;
    let db_path = dir.path().join("wikipedia.db");
    let conn = rusqlite::Connection::open(&db_path)?;
    conn.execute_batch(
        "CREATE TABLE articles (pageid INTEGER, title TEXT, url TEXT, relevance_score REAL,
             latitude REAL, longitude REAL, categories TEXT);
         CREATE TABLE page_summaries (page_id INTEGER, short_summary TEXT, long_summary TEXT,
             key_topics TEXT, best_city TEXT, best_state TEXT, confidence_score REAL);",
    )?;

    let config = PipelineConfig {
        run: RunConfig {
            sample_size: None,
            parallelism: 2,
            stop_on_error: false,
        },
        sources: SourcesConfig {
            properties: dir.path().join("properties.json").to_string_lossy().to_string(),
            neighborhoods: dir
                .path()
                .join("neighborhoods.json")
                .to_string_lossy()
                .to_string(),
            wikipedia_db: db_path.to_string_lossy().to_string(),
            locations: dir.path().join("locations.json").to_string_lossy().to_string(),
        },
        enrichment: EnrichmentConfig::default(),
        embedding: EmbeddingConfig {
            provider: ProviderKind::Mock,
            ..Default::default()
        },
        chunking: Default::default(),
        sinks: SinksConfig::default(),
    };

    let runner = PipelineRunner::new(config);
    let report = runner.run().await?;
    assert!(report.failures.is_empty(), "empty sources are not an error");
    assert!(report.all_sources_empty());
    assert_eq!(report.exit_code(), 3);
    Ok(())
}

#[tokio::test]
async fn test_missing_source_fails_only_that_entity() {
    let dir = tempfile::tempdir().unwrap();
    let mut sources = write_fixture_sources(dir.path());
    sources.properties = dir.path().join("does-not-exist.json").to_string_lossy().to_string();

    let config = PipelineConfig {
        run: RunConfig {
            sample_size: None,
            parallelism: 2,
            stop_on_error: false,
        },
        sources,
        enrichment: EnrichmentConfig::default(),
        embedding: EmbeddingConfig {
            provider: ProviderKind::Mock,
            ..Default::default()
        },
        chunking: Default::default(),
        sinks: SinksConfig::default(),
    };

    let runner = PipelineRunner::new(config);
    let report = runner.run().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].entity, "property");
    assert_eq!(report.failures[0].stage, "bronze");
    // The other two entities still reached gold.
    assert_eq!(report.entities["neighborhood"].gold_records, 1);
    assert_eq!(report.entities["wikipedia"].gold_records, 2);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_enriched_rows_survive_store_round_trip() {
    let fixture = fixture();
    let collaborators = collaborators_for(fixture.config.clone(), mock_factory(MockProvider::new(8)));
    advance_all(&collaborators).await;

    let store = &collaborators.store;
    let properties = store
        .rows::<PropertyGoldRow>(&TableName::tiered(EntityType::Property, Tier::Gold, 999))
        .unwrap();
    let neighborhoods = store
        .rows::<NeighborhoodGoldRow>(&TableName::tiered(EntityType::Neighborhood, Tier::Gold, 999))
        .unwrap();
    let enriched = CrossEntityEnricher::property_neighborhood(&properties, &neighborhoods);
    let name = TableName::enriched(EntityType::Property, EntityType::Neighborhood, 999);
    store.create(&name, enriched).unwrap();

    let rows = store.rows::<EnrichedPropertyRow>(&name).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(store.count(&name).unwrap(), 3);
    let schema = store.schema(&name).unwrap();
    assert!(schema.iter().any(|f| f.name == "enrichment_success"));
}
