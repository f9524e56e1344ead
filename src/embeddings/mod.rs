//! Embedding generation: provider abstraction, text chunking, and the
//! sharded batch engine that attaches vectors to gold rows.

pub mod chunking;
pub mod engine;
pub mod provider;
pub mod providers;

pub use engine::{EmbeddingEngine, EmbeddingRow, EmbeddingStats, NodeMetadata};
pub use provider::{create_provider_factory, EmbeddingProvider, ProviderFactory};
pub use providers::mock::MockProvider;
