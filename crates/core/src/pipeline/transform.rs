use super::cache::{CacheStats, ExecutionCache};
use super::collector::ResultCollector;
use super::sweep::SweepExpander;
use crate::chain::{Chain, ChainTemplate};
use crate::config::EngineConfig;
use crate::error::PipelineResult;
use crate::results::{filter_results, ResultSet};
use crate::stage::{StageFunction, StageOutput};
use crate::types::{Key, Kwargs, RunId, Value};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Statistics for one `transform` call
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub chains: usize,
    pub contexts: usize,
    pub skipped: usize,
    pub cache: CacheStats,
}

/// An ordered collection of chains plus the settings to run them with
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    chains: Vec<Chain>,
    config: EngineConfig,
}

impl Pipeline {
    pub fn new(chains: Vec<Chain>) -> Self {
        Self {
            chains,
            config: EngineConfig::default(),
        }
    }

    /// Expand each template into its chains, keeping template order
    pub fn from_templates(templates: &[ChainTemplate]) -> PipelineResult<Self> {
        let mut chains = Vec::new();
        for template in templates {
            chains.extend(template.expand()?);
        }
        Ok(Self::new(chains))
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every chain against `dataset`, whose elements populate keys `0..n`
    pub fn transform(&self, dataset: &[Value]) -> PipelineResult<ResultSet> {
        self.transform_named(dataset, BTreeMap::new())
    }

    /// Like [`Pipeline::transform`], also seeding named inputs
    pub fn transform_named(
        &self,
        dataset: &[Value],
        named: BTreeMap<String, Value>,
    ) -> PipelineResult<ResultSet> {
        self.transform_with_summary(dataset, named)
            .map(|(results, _)| results)
    }

    pub fn transform_with_summary(
        &self,
        dataset: &[Value],
        named: BTreeMap<String, Value>,
    ) -> PipelineResult<(ResultSet, RunSummary)> {
        let run_id = RunId::new();
        let started_at = Utc::now();

        tracing::info!(
            "Starting transform: run_id={}, chains={}, dataset_len={}",
            run_id,
            self.chains.len(),
            dataset.len()
        );

        let mut seed: BTreeMap<Key, Value> = dataset
            .iter()
            .enumerate()
            .map(|(index, value)| (Key::Index(index), value.clone()))
            .collect();
        seed.extend(named.into_iter().map(|(name, value)| (Key::Name(name), value)));

        let collector = ResultCollector::new(
            SweepExpander::new(self.config.max_bindings_per_chain),
            self.config.failure_policy,
        );
        let mut cache = ExecutionCache::new();

        let collected = match collector.collect(run_id, &self.chains, &seed, &mut cache) {
            Ok(collected) => collected,
            Err(e) => {
                tracing::error!("Transform failed: run_id={}, error={}", run_id, e);
                return Err(e);
            }
        };

        let summary = RunSummary {
            run_id,
            started_at,
            completed_at: Utc::now(),
            chains: self.chains.len(),
            contexts: collected.results.iter().map(Vec::len).sum(),
            skipped: collected.skipped,
            cache: cache.stats(),
        };

        tracing::info!(
            "Transform completed: run_id={}, contexts={}, skipped={}, cache_hits={}, cache_misses={}",
            run_id,
            summary.contexts,
            summary.skipped,
            summary.cache.hits,
            summary.cache.misses
        );

        Ok((collected.results, summary))
    }

    /// Use this whole pipeline as a single stage of another one
    pub fn into_stage_function(self) -> PipelineStage {
        PipelineStage {
            pipeline: Arc::new(self),
        }
    }
}

/// A pipeline wrapped as a [`StageFunction`].
///
/// Positional inputs become the inner dataset and keyword arguments become
/// named inputs. The single output is every inner context as a JSON array of
/// objects, flattened across chains.
#[derive(Debug, Clone)]
pub struct PipelineStage {
    pipeline: Arc<Pipeline>,
}

impl StageFunction for PipelineStage {
    fn call(&self, inputs: &[Value], kwargs: &Kwargs) -> anyhow::Result<StageOutput> {
        let results = self.pipeline.transform_named(inputs, kwargs.clone())?;
        let rows = filter_results(&results, None, true).into_rows();
        Ok(StageOutput::Single(serde_json::to_value(rows)?))
    }
}
