use crate::chain::Chain;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{StageId, Value};

/// One concrete choice of value for every sweep dimension of a chain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
    assignments: Vec<(StageId, String, Value)>,
}

impl Binding {
    /// The value chosen for `param` on `stage`, if that stage sweeps it
    pub fn get(&self, stage: StageId, param: &str) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|(id, name, _)| *id == stage && name == param)
            .map(|(_, _, value)| value)
    }

    /// Assignments in dimension order
    pub fn assignments(&self) -> &[(StageId, String, Value)] {
        &self.assignments
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// A sweep dimension collected from a chain
#[derive(Debug, Clone)]
struct Dimension<'a> {
    stage: StageId,
    param: &'a str,
    values: &'a [Value],
}

/// Enumerates the bindings of a chain
#[derive(Debug, Clone, Copy)]
pub struct SweepExpander {
    max_bindings: usize,
}

impl SweepExpander {
    pub fn new(max_bindings: usize) -> Self {
        Self { max_bindings }
    }

    /// Number of bindings `chain` expands to, without materializing them
    pub fn cardinality(&self, chain: &Chain) -> u128 {
        Self::dimensions(chain)
            .iter()
            .fold(1u128, |acc, dim| acc.saturating_mul(dim.values.len() as u128))
    }

    /// All bindings of `chain` in cartesian order. The last dimension varies
    /// fastest; a chain without sweeps yields a single empty binding.
    pub fn expand(&self, chain_index: usize, chain: &Chain) -> PipelineResult<Vec<Binding>> {
        let dimensions = Self::dimensions(chain);
        let total = self.cardinality(chain);

        if total > self.max_bindings as u128 {
            return Err(PipelineError::SweepOverflow {
                chain: chain_index,
                bindings: total,
                limit: self.max_bindings,
            });
        }

        let radices: Vec<usize> = dimensions.iter().map(|dim| dim.values.len()).collect();
        let bindings: Vec<Binding> = cartesian_indices(&radices)
            .map(|point| Binding {
                assignments: dimensions
                    .iter()
                    .zip(point)
                    .map(|(dim, index)| (dim.stage, dim.param.to_string(), dim.values[index].clone()))
                    .collect(),
            })
            .collect();

        tracing::debug!(
            "Chain {} expands over {} dimensions into {} bindings",
            chain_index,
            dimensions.len(),
            bindings.len()
        );

        Ok(bindings)
    }

    fn dimensions(chain: &Chain) -> Vec<Dimension<'_>> {
        chain
            .unique_stages()
            .into_iter()
            .flat_map(|stage| {
                stage.sweep_dimensions().map(move |(param, values)| Dimension {
                    stage: stage.id(),
                    param,
                    values,
                })
            })
            .collect()
    }
}

/// Mixed-radix counter over `radices`, yielding index vectors in
/// lexicographic order. Empty radices yield one empty point; any zero radix
/// yields nothing.
pub(crate) fn cartesian_indices(radices: &[usize]) -> CartesianIndices {
    CartesianIndices {
        radices: radices.to_vec(),
        next: if radices.contains(&0) {
            None
        } else {
            Some(vec![0; radices.len()])
        },
    }
}

pub(crate) struct CartesianIndices {
    radices: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Iterator for CartesianIndices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;

        let mut successor = current.clone();
        for position in (0..successor.len()).rev() {
            successor[position] += 1;
            if successor[position] < self.radices[position] {
                self.next = Some(successor);
                break;
            }
            successor[position] = 0;
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Stage, StageOutput};
    use crate::types::Kwargs;
    use serde_json::json;

    fn noop(_: &[Value], _: &Kwargs) -> anyhow::Result<StageOutput> {
        Ok(Value::Null.into())
    }

    #[test]
    fn test_cartesian_indices_order() {
        let points: Vec<Vec<usize>> = cartesian_indices(&[2, 3]).collect();
        assert_eq!(
            points,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2],
            ]
        );
    }

    #[test]
    fn test_cartesian_indices_edge_cases() {
        assert_eq!(cartesian_indices(&[]).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
        assert_eq!(cartesian_indices(&[3, 0]).count(), 0);
    }

    #[test]
    fn test_chain_without_sweep_has_one_empty_binding() {
        let stage = Stage::builder("s", noop)
            .output(1usize)
            .kwarg("factor", 2.0)
            .build()
            .unwrap();
        let chain = Chain::new(vec![stage]);

        let bindings = SweepExpander::new(10).expand(0, &chain).unwrap();
        assert_eq!(bindings.len(), 1);
        assert!(bindings[0].is_empty());
    }

    #[test]
    fn test_bindings_follow_stage_then_declared_order() {
        let first = Stage::builder("first", noop)
            .output(1usize)
            .sweep("a", [1, 2])
            .build()
            .unwrap();
        let second = Stage::builder("second", noop)
            .output(2usize)
            .sweep("b", ["x", "y", "z"])
            .build()
            .unwrap();
        let chain = Chain::new(vec![first.clone(), second.clone()]);

        let bindings = SweepExpander::new(100).expand(0, &chain).unwrap();
        assert_eq!(bindings.len(), 6);

        let pairs: Vec<(Value, Value)> = bindings
            .iter()
            .map(|b| {
                (
                    b.get(first.id(), "a").cloned().unwrap(),
                    b.get(second.id(), "b").cloned().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                (json!(1), json!("x")),
                (json!(1), json!("y")),
                (json!(1), json!("z")),
                (json!(2), json!("x")),
                (json!(2), json!("y")),
                (json!(2), json!("z")),
            ]
        );
        assert!(bindings[0].get(second.id(), "a").is_none());
    }

    #[test]
    fn test_repeated_stage_contributes_dimensions_once() {
        let stage = Stage::builder("s", noop)
            .output(1usize)
            .sweep("y", [1, 2, 3])
            .build()
            .unwrap();
        let chain = Chain::new(vec![stage.clone(), stage]);

        let bindings = SweepExpander::new(100).expand(0, &chain).unwrap();
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].assignments().len(), 1);
    }

    #[test]
    fn test_overflow_is_rejected_before_materializing() {
        let wide: Vec<i64> = (0..1000).collect();
        let stage = Stage::builder("s", noop)
            .output(1usize)
            .sweep("a", wide.clone())
            .sweep("b", wide.clone())
            .sweep("c", wide)
            .build()
            .unwrap();
        let chain = Chain::new(vec![stage]);
        let expander = SweepExpander::new(10_000);

        assert_eq!(expander.cardinality(&chain), 1_000_000_000);
        let err = expander.expand(4, &chain).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SweepOverflow {
                chain: 4,
                limit: 10_000,
                ..
            }
        ));
    }
}
