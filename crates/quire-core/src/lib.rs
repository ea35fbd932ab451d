//! Grounding policy, generation, audit, and query orchestration for quire.

pub mod audit;
pub mod bootstrap;
pub mod citation;
pub mod confidence;
pub mod config;
pub mod eval;
pub mod format;
pub mod generator;
pub mod pipeline;
pub mod prompt;
pub mod vault;

pub use audit::{AuditError, AuditLogger, QueryResult};
pub use config::Config;
pub use confidence::{Confidence, ConfidenceLevel, ConfidencePolicy};
pub use generator::{FallbackReason, Generation, Generator, Outcome};
pub use pipeline::{PipelineError, QueryResponse, RagPipeline, RebuildReport};
