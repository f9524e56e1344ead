//! Entity orchestrators and the top-level runner.

pub mod orchestrator;
pub mod report;
pub mod runner;

pub use orchestrator::{Collaborators, EntityOrchestrator, OrchestratorState, ProcessedTable, Stage};
pub use report::{EntityMetrics, QualityDistribution, RunReport, RunStatus, StageFailure};
pub use runner::{PipelineRegistry, PipelineRunner};
