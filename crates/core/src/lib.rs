// Core engine for Sweepline: declarative stage pipelines with parameter sweeps

pub mod types;
pub mod error;
pub mod stage;
pub mod chain;
pub mod pipeline;
pub mod results;
pub mod config;
pub mod registry;
pub mod document;

pub use chain::{Chain, ChainTemplate};
pub use config::{EngineConfig, FailurePolicy};
pub use document::PipelineDocument;
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use pipeline::{Pipeline, RunSummary};
pub use registry::FunctionRegistry;
pub use results::{filter_results, filter_results_lifted, FilteredResults, ResultContext, ResultSet, Row};
pub use stage::{with_arity, Stage, StageBuilder, StageFunction, StageOutput};
pub use types::*;
