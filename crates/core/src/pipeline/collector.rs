use super::cache::ExecutionCache;
use super::executor::GraphExecutor;
use super::sweep::{Binding, SweepExpander};
use crate::chain::Chain;
use crate::config::FailurePolicy;
use crate::error::PipelineResult;
use crate::results::ResultSet;
use crate::types::{Key, RunId, Value};
use std::collections::{BTreeMap, HashSet};

/// Outcome of collecting every chain of a pipeline
#[derive(Debug)]
pub struct Collected {
    pub results: ResultSet,
    pub skipped: usize,
}

/// Runs every chain under every binding and groups the contexts
pub struct ResultCollector {
    expander: SweepExpander,
    failure_policy: FailurePolicy,
}

impl ResultCollector {
    pub fn new(expander: SweepExpander, failure_policy: FailurePolicy) -> Self {
        Self {
            expander,
            failure_policy,
        }
    }

    /// Validate and expand every chain up front, then execute them in order.
    ///
    /// Specification errors abort regardless of the failure policy.
    pub fn collect(
        &self,
        run_id: RunId,
        chains: &[Chain],
        seed: &BTreeMap<Key, Value>,
        cache: &mut ExecutionCache,
    ) -> PipelineResult<Collected> {
        let dataset_len = seed
            .keys()
            .filter_map(|key| match key {
                Key::Index(index) => Some(index + 1),
                Key::Name(_) => None,
            })
            .max()
            .unwrap_or(0);
        let named_inputs: HashSet<String> = seed
            .keys()
            .filter_map(|key| key.as_name().map(str::to_string))
            .collect();

        let plans: Vec<Vec<Binding>> = chains
            .iter()
            .enumerate()
            .map(|(chain_index, chain)| -> PipelineResult<Vec<Binding>> {
                chain.validate(dataset_len, &named_inputs)?;
                self.expander.expand(chain_index, chain)
            })
            .collect::<PipelineResult<_>>()?;

        let mut results = ResultSet::with_capacity(chains.len());
        let mut skipped = 0;

        for (chain_index, (chain, bindings)) in chains.iter().zip(&plans).enumerate() {
            tracing::debug!(
                "Run {}: executing chain {} ({} stages, {} bindings)",
                run_id,
                chain_index,
                chain.len(),
                bindings.len()
            );

            let mut contexts = Vec::with_capacity(bindings.len());
            for (binding_index, binding) in bindings.iter().enumerate() {
                match GraphExecutor::run(chain_index, binding_index, chain, binding, seed, cache) {
                    Ok(context) => contexts.push(context),
                    Err(e) if self.failure_policy == FailurePolicy::Skip => {
                        tracing::warn!(
                            "Run {}: skipping chain {} binding {}: {}",
                            run_id,
                            chain_index,
                            binding_index,
                            e
                        );
                        skipped += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            "Run {}: chain {} binding {} failed: {}",
                            run_id,
                            chain_index,
                            binding_index,
                            e
                        );
                        return Err(e);
                    }
                }
            }
            results.push(contexts);
        }

        Ok(Collected { results, skipped })
    }
}
