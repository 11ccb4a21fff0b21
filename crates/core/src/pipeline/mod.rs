// Pipeline execution engine: sweep expansion, memoized execution, collection

pub mod cache;
pub mod collector;
pub mod executor;
pub mod sweep;
pub mod transform;

pub use cache::{CacheKey, CacheStats, ExecutionCache, Fingerprint};
pub use collector::{Collected, ResultCollector};
pub use executor::GraphExecutor;
pub use sweep::{Binding, SweepExpander};
pub use transform::{Pipeline, PipelineStage, RunSummary};
