use super::cache::{CacheKey, ExecutionCache};
use super::sweep::Binding;
use crate::chain::Chain;
use crate::error::{PipelineError, PipelineResult};
use crate::results::ResultContext;
use crate::stage::Stage;
use crate::types::{Key, KwargValue, Kwargs, Value};
use std::collections::BTreeMap;

/// Runs one chain under one binding
pub struct GraphExecutor;

impl GraphExecutor {
    /// Execute every stage of `chain` in order against a copy of `seed`.
    ///
    /// Stage outputs are served from `cache` when the same stage has already
    /// run with equal kwargs and inputs during this call.
    pub fn run(
        chain_index: usize,
        binding_index: usize,
        chain: &Chain,
        binding: &Binding,
        seed: &BTreeMap<Key, Value>,
        cache: &mut ExecutionCache,
    ) -> PipelineResult<ResultContext> {
        let mut values = seed.clone();
        let mut params = BTreeMap::new();

        for stage in chain.stages() {
            let inputs = Self::resolve_inputs(stage, &values)?;
            let kwargs = Self::resolve_kwargs(stage, binding)?;
            let key = CacheKey::new(stage.id(), &kwargs, &inputs);

            let outputs = match cache.lookup(&key) {
                Some(outputs) => {
                    tracing::trace!("Reusing cached outputs of stage {} ({})", stage.name(), stage.id());
                    outputs
                }
                None => {
                    tracing::trace!(
                        "Executing stage {} ({}) with {} inputs",
                        stage.name(),
                        stage.id(),
                        inputs.len()
                    );
                    let outputs = stage.invoke(&inputs, &kwargs)?;
                    cache.store(key, outputs.clone());
                    outputs
                }
            };

            for (key, value) in stage.outputs().iter().zip(outputs) {
                values.insert(key.clone(), value);
            }

            for (param, _) in stage.sweep_dimensions() {
                if let Some(value) = kwargs.get(param) {
                    params.insert(param.to_string(), value.clone());
                }
            }
        }

        Ok(ResultContext::new(chain_index, binding_index, values, params))
    }

    fn resolve_inputs(stage: &Stage, values: &BTreeMap<Key, Value>) -> PipelineResult<Vec<Value>> {
        stage
            .inputs()
            .iter()
            .map(|key| {
                values
                    .get(key)
                    .cloned()
                    .ok_or_else(|| PipelineError::UnresolvedInput {
                        stage: stage.name().to_string(),
                        key: key.clone(),
                    })
            })
            .collect()
    }

    /// Fixed kwargs pass through; sweep dimensions take the bound value
    fn resolve_kwargs(stage: &Stage, binding: &Binding) -> PipelineResult<Kwargs> {
        stage
            .kwargs()
            .iter()
            .map(|(name, value)| -> PipelineResult<(String, Value)> {
                let resolved = match value {
                    KwargValue::Fixed(value) => value.clone(),
                    KwargValue::Sweep { .. } => binding
                        .get(stage.id(), name)
                        .cloned()
                        .ok_or_else(|| PipelineError::InvalidStage {
                            stage: stage.name().to_string(),
                            reason: format!("no value bound for sweep parameter '{}'", name),
                        })?,
                };
                Ok((name.clone(), resolved))
            })
            .collect()
    }
}
