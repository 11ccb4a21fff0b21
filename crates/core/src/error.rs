//! Error types for pipeline construction and execution.

use crate::types::{Key, StageId};

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Specification,
    UnresolvedInput,
    Arity,
    UserFunction,
    Config,
}

/// Errors that can occur while building or running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage declaration is malformed.
    #[error("Invalid stage '{stage}': {reason}")]
    InvalidStage { stage: String, reason: String },

    /// A sweep dimension was declared with no values.
    #[error("Stage '{stage}' declares an empty sweep for '{param}'")]
    EmptySweep { stage: String, param: String },

    /// A key would be populated twice within one execution path.
    #[error("Key {key} collides: {reason}")]
    KeyCollision { key: Key, reason: String },

    /// A chain expands to more bindings than allowed.
    #[error("Chain {chain} expands to {bindings} bindings, limit is {limit}")]
    SweepOverflow {
        chain: usize,
        bindings: u128,
        limit: usize,
    },

    /// A stage input was never populated.
    #[error("Stage '{stage}' requires input {key}, which has not been populated")]
    UnresolvedInput { stage: String, key: Key },

    /// A stage returned a different number of values than it declares.
    #[error("Stage '{stage}' declares {expected} outputs but returned {actual}")]
    Arity {
        stage: String,
        expected: usize,
        actual: usize,
    },

    /// The stage function itself failed.
    #[error("Stage '{stage}' ({id}) failed: {source}")]
    UserFunction {
        stage: String,
        id: StageId,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pipeline document could not be loaded.
    #[error("Pipeline document error: {0}")]
    Document(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidStage { .. }
            | Self::EmptySweep { .. }
            | Self::KeyCollision { .. }
            | Self::SweepOverflow { .. }
            | Self::Document(_) => ErrorKind::Specification,
            Self::UnresolvedInput { .. } => ErrorKind::UnresolvedInput,
            Self::Arity { .. } => ErrorKind::Arity,
            Self::UserFunction { .. } => ErrorKind::UserFunction,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this error was detected before any stage ran.
    pub fn is_specification_error(&self) -> bool {
        self.kind() == ErrorKind::Specification
    }
}
