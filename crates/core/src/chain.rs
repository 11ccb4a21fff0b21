// Chains: ordered execution paths over shared stages

use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::sweep::cartesian_indices;
use crate::stage::Stage;
use crate::types::{Key, StageId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An ordered sequence of stages. Stages run exactly in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    stages: Vec<Arc<Stage>>,
}

impl Chain {
    pub fn new(stages: Vec<Arc<Stage>>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Arc<Stage>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Distinct stages in first-occurrence order
    pub fn unique_stages(&self) -> Vec<&Arc<Stage>> {
        let mut seen = HashSet::new();
        self.stages
            .iter()
            .filter(|stage| seen.insert(stage.id()))
            .collect()
    }

    /// Check that no key would be populated twice along this chain.
    ///
    /// `dataset_len` and `named_inputs` describe the seed context. A stage
    /// listed more than once may rewrite its own outputs.
    pub fn validate(&self, dataset_len: usize, named_inputs: &HashSet<String>) -> PipelineResult<()> {
        let mut writers: HashMap<&Key, StageId> = HashMap::new();
        let mut swept: HashMap<&str, StageId> = HashMap::new();

        for stage in &self.stages {
            for key in stage.outputs() {
                let seeded = match key {
                    Key::Index(index) => *index < dataset_len,
                    Key::Name(name) => named_inputs.contains(name),
                };
                if seeded {
                    return Err(PipelineError::KeyCollision {
                        key: key.clone(),
                        reason: format!("stage '{}' overwrites an input slot", stage.name()),
                    });
                }

                match writers.get(key) {
                    Some(owner) if *owner != stage.id() => {
                        return Err(PipelineError::KeyCollision {
                            key: key.clone(),
                            reason: format!(
                                "stage '{}' redeclares an output of an earlier stage",
                                stage.name()
                            ),
                        });
                    }
                    _ => {
                        writers.insert(key, stage.id());
                    }
                }
            }

            for (param, _) in stage.sweep_dimensions() {
                match swept.get(param) {
                    Some(owner) if *owner != stage.id() => {
                        return Err(PipelineError::KeyCollision {
                            key: Key::name(param),
                            reason: format!(
                                "stage '{}' sweeps a parameter already swept in this chain",
                                stage.name()
                            ),
                        });
                    }
                    _ => {
                        swept.insert(param, stage.id());
                    }
                }
            }
        }

        for param in swept.keys() {
            if writers.contains_key(&Key::name(*param)) || named_inputs.contains(*param) {
                return Err(PipelineError::KeyCollision {
                    key: Key::name(*param),
                    reason: "sweep parameter shares its name with a data key".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl From<Vec<Arc<Stage>>> for Chain {
    fn from(stages: Vec<Arc<Stage>>) -> Self {
        Self::new(stages)
    }
}

/// A chain whose slots may hold alternative stages or stage sequences.
///
/// Expands to one [`Chain`] per combination of alternatives.
#[derive(Debug, Clone, Default)]
pub struct ChainTemplate {
    /// Each slot lists its alternatives; each alternative is a run of stages
    slots: Vec<Vec<Vec<Arc<Stage>>>>,
}

impl ChainTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot that always runs `stage`
    pub fn then(mut self, stage: Arc<Stage>) -> Self {
        self.slots.push(vec![vec![stage]]);
        self
    }

    /// Append a slot that runs one of `alternatives`
    pub fn one_of(self, alternatives: Vec<Arc<Stage>>) -> Self {
        self.one_of_sequences(alternatives.into_iter().map(|stage| vec![stage]).collect())
    }

    /// Append a slot that runs one of several stage sequences. An empty
    /// sequence leaves the slot out of that chain.
    pub fn one_of_sequences(mut self, alternatives: Vec<Vec<Arc<Stage>>>) -> Self {
        self.slots.push(alternatives);
        self
    }

    /// Concrete chains in cartesian order: first slot varies slowest
    pub fn expand(&self) -> PipelineResult<Vec<Chain>> {
        if let Some(empty) = self.slots.iter().position(|slot| slot.is_empty()) {
            return Err(PipelineError::InvalidStage {
                stage: format!("slot {}", empty),
                reason: "a chain slot must offer at least one alternative".to_string(),
            });
        }

        let radices: Vec<usize> = self.slots.iter().map(Vec::len).collect();
        let chains = cartesian_indices(&radices)
            .map(|choice| {
                Chain::new(
                    choice
                        .iter()
                        .zip(&self.slots)
                        .flat_map(|(&index, slot)| slot[index].iter().cloned())
                        .collect(),
                )
            })
            .collect();

        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageOutput;
    use crate::types::{Kwargs, Value};
    use serde_json::json;

    fn noop(_: &[Value], _: &Kwargs) -> anyhow::Result<StageOutput> {
        Ok(json!(null).into())
    }

    fn stage(name: &str, output: impl Into<Key>) -> Arc<Stage> {
        Stage::builder(name, noop).output(output).build().unwrap()
    }

    #[test]
    fn test_repeated_stage_may_rewrite_outputs() {
        let a = stage("a", 1usize);
        let chain = Chain::new(vec![a.clone(), a]);
        assert!(chain.validate(1, &HashSet::new()).is_ok());
        assert_eq!(chain.unique_stages().len(), 1);
    }

    #[test]
    fn test_distinct_stages_cannot_share_output() {
        let chain = Chain::new(vec![stage("a", "out"), stage("b", "out")]);
        let err = chain.validate(0, &HashSet::new()).unwrap_err();
        assert!(matches!(err, PipelineError::KeyCollision { .. }));
    }

    #[test]
    fn test_output_cannot_overwrite_dataset_slot() {
        let chain = Chain::new(vec![stage("a", 2usize)]);
        assert!(chain.validate(3, &HashSet::new()).is_err());
        assert!(chain.validate(2, &HashSet::new()).is_ok());

        let named: HashSet<String> = ["features".to_string()].into_iter().collect();
        let chain = Chain::new(vec![stage("b", "features")]);
        assert!(chain.validate(0, &named).is_err());
    }

    #[test]
    fn test_sweep_name_collisions() {
        let first = Stage::builder("first", noop)
            .output(1usize)
            .sweep("y", [1, 2])
            .build()
            .unwrap();
        let second = Stage::builder("second", noop)
            .output(2usize)
            .sweep("y", [3])
            .build()
            .unwrap();
        let chain = Chain::new(vec![first.clone(), second]);
        assert!(chain.validate(1, &HashSet::new()).is_err());

        let named_y = stage("named", "y");
        let chain = Chain::new(vec![first, named_y]);
        assert!(chain.validate(1, &HashSet::new()).is_err());
    }

    #[test]
    fn test_template_expands_in_slot_order() {
        let load = stage("load", 1usize);
        let fast = stage("fast", 2usize);
        let slow = stage("slow", 2usize);
        let report_a = stage("report_a", 3usize);
        let report_b = stage("report_b", 3usize);

        let chains = ChainTemplate::new()
            .then(load.clone())
            .one_of(vec![fast.clone(), slow.clone()])
            .one_of(vec![report_a, report_b])
            .expand()
            .unwrap();

        let names: Vec<Vec<&str>> = chains
            .iter()
            .map(|chain| chain.stages().iter().map(|s| s.name()).collect())
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["load", "fast", "report_a"],
                vec!["load", "fast", "report_b"],
                vec!["load", "slow", "report_a"],
                vec!["load", "slow", "report_b"],
            ]
        );

        // Alternatives keep their identity
        assert_eq!(chains[0].stages()[0].id(), load.id());
        assert_eq!(chains[3].stages()[0].id(), load.id());
    }

    #[test]
    fn test_template_rejects_empty_slot() {
        let result = ChainTemplate::new().one_of(vec![]).expand();
        assert!(result.is_err());
    }

    #[test]
    fn test_template_alternatives_may_be_sequences() {
        let load = stage("load", 1usize);
        let clean = stage("clean", 2usize);
        let fit = stage("fit", 3usize);
        let report = stage("report", 4usize);

        let chains = ChainTemplate::new()
            .then(load)
            .one_of_sequences(vec![vec![clean, fit.clone()], vec![fit], vec![]])
            .then(report)
            .expand()
            .unwrap();

        let names: Vec<Vec<&str>> = chains
            .iter()
            .map(|chain| chain.stages().iter().map(|s| s.name()).collect())
            .collect();
        assert_eq!(
            names,
            vec![
                vec!["load", "clean", "fit", "report"],
                vec!["load", "fit", "report"],
                vec!["load", "report"],
            ]
        );
        assert_eq!(chains[0].stages()[2].id(), chains[1].stages()[1].id());
    }
}
