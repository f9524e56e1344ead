// Core modules organized by pipeline stage
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod scores;
pub mod sources;
pub mod store;
pub mod tiers;

// Cross-entity enrichment and embedding generation
pub mod embeddings;
pub mod enrich;

// Terminal writers
pub mod sinks;

// Orchestration layer
pub mod pipeline;
