use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What `transform` does when one (chain, binding) execution fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure and return it
    #[default]
    Abort,
    /// Log the failure, leave that context out and keep going
    Skip,
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on the bindings a single chain may expand to
    #[serde(default = "default_max_bindings")]
    pub max_bindings_per_chain: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_max_bindings() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_bindings_per_chain: default_max_bindings(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, or fall back to defaults if it does not exist
    pub fn load(config_path: &Path) -> PipelineResult<Self> {
        if !config_path.exists() {
            tracing::info!(
                "Configuration file {} not found, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read {}: {}",
                config_path.display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_bindings(mut self, max_bindings_per_chain: usize) -> Self {
        self.max_bindings_per_chain = max_bindings_per_chain;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.max_bindings_per_chain == 0 {
            return Err(PipelineError::Config(
                "max_bindings_per_chain must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
