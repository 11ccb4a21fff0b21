// Stage declarations: a function plus its input/output keys and keyword arguments

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Key, KwargValue, Kwargs, StageId, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// What a stage function hands back to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    /// A bare value, accepted directly by single-output stages
    Single(Value),
    /// Positional values, unpacked into the declared outputs
    Tuple(Vec<Value>),
}

impl StageOutput {
    fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Tuple(values) => values.len(),
        }
    }
}

impl From<Value> for StageOutput {
    fn from(value: Value) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<Value>> for StageOutput {
    fn from(values: Vec<Value>) -> Self {
        Self::Tuple(values)
    }
}

/// A computation the engine can invoke. The engine never inspects it beyond
/// the declared arity.
pub trait StageFunction: Send + Sync {
    /// Invoke with resolved positional inputs and keyword arguments
    fn call(&self, inputs: &[Value], kwargs: &Kwargs) -> anyhow::Result<StageOutput>;

    /// Number of positional inputs the function accepts, if known up front
    fn arity(&self) -> Option<usize> {
        None
    }
}

impl<F> StageFunction for F
where
    F: Fn(&[Value], &Kwargs) -> anyhow::Result<StageOutput> + Send + Sync,
{
    fn call(&self, inputs: &[Value], kwargs: &Kwargs) -> anyhow::Result<StageOutput> {
        self(inputs, kwargs)
    }
}

/// A closure paired with the number of inputs it expects
pub struct WithArity<F> {
    arity: usize,
    function: F,
}

/// Declare the positional arity of a closure so it can be checked at build time
pub fn with_arity<F>(arity: usize, function: F) -> WithArity<F>
where
    F: Fn(&[Value], &Kwargs) -> anyhow::Result<StageOutput> + Send + Sync,
{
    WithArity { arity, function }
}

impl<F> StageFunction for WithArity<F>
where
    F: Fn(&[Value], &Kwargs) -> anyhow::Result<StageOutput> + Send + Sync,
{
    fn call(&self, inputs: &[Value], kwargs: &Kwargs) -> anyhow::Result<StageOutput> {
        (self.function)(inputs, kwargs)
    }

    fn arity(&self) -> Option<usize> {
        Some(self.arity)
    }
}

/// A normalized stage. Shared between chains as `Arc<Stage>`; identity is
/// carried by [`StageId`].
pub struct Stage {
    id: StageId,
    name: String,
    function: Arc<dyn StageFunction>,
    inputs: Vec<Key>,
    outputs: Vec<Key>,
    kwargs: Vec<(String, KwargValue)>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

impl Stage {
    /// Start declaring a stage around a function
    pub fn builder(name: impl Into<String>, function: impl StageFunction + 'static) -> StageBuilder {
        StageBuilder::new(name, Arc::new(function))
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Key] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Key] {
        &self.outputs
    }

    pub fn kwargs(&self) -> &[(String, KwargValue)] {
        &self.kwargs
    }

    /// Sweep dimensions in declaration order
    pub fn sweep_dimensions(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.kwargs.iter().filter_map(|(name, value)| match value {
            KwargValue::Sweep { sweep } => Some((name.as_str(), sweep.as_slice())),
            KwargValue::Fixed(_) => None,
        })
    }

    pub fn has_sweep(&self) -> bool {
        self.kwargs.iter().any(|(_, value)| value.is_sweep())
    }

    pub(crate) fn invoke(&self, inputs: &[Value], kwargs: &Kwargs) -> PipelineResult<Vec<Value>> {
        let output = self
            .function
            .call(inputs, kwargs)
            .map_err(|source| PipelineError::UserFunction {
                stage: self.name.clone(),
                id: self.id,
                source,
            })?;
        self.unpack(output)
    }

    /// Match a returned value against the declared outputs
    pub fn unpack(&self, output: StageOutput) -> PipelineResult<Vec<Value>> {
        let expected = self.outputs.len();
        match (expected, output) {
            (1, StageOutput::Single(value)) => Ok(vec![value]),
            (0, StageOutput::Single(Value::Null)) => Ok(Vec::new()),
            (_, StageOutput::Tuple(values)) if values.len() == expected => Ok(values),
            (_, output) => Err(PipelineError::Arity {
                stage: self.name.clone(),
                expected,
                actual: output.len(),
            }),
        }
    }
}

/// Builder for [`Stage`]
pub struct StageBuilder {
    name: String,
    function: Arc<dyn StageFunction>,
    inputs: Vec<Key>,
    outputs: Vec<Key>,
    kwargs: Vec<(String, KwargValue)>,
}

impl StageBuilder {
    pub fn new(name: impl Into<String>, function: Arc<dyn StageFunction>) -> Self {
        Self {
            name: name.into(),
            function,
            inputs: Vec::new(),
            outputs: Vec::new(),
            kwargs: Vec::new(),
        }
    }

    pub fn input(mut self, key: impl Into<Key>) -> Self {
        self.inputs.push(key.into());
        self
    }

    pub fn inputs<K: Into<Key>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.inputs.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, key: impl Into<Key>) -> Self {
        self.outputs.push(key.into());
        self
    }

    pub fn outputs<K: Into<Key>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.outputs.extend(keys.into_iter().map(Into::into));
        self
    }

    /// A keyword argument passed unchanged to every invocation
    pub fn kwarg(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwarg_value(name, KwargValue::Fixed(value.into()))
    }

    /// A keyword argument swept over every listed value
    pub fn sweep<V: Into<Value>>(self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.kwarg_value(name, KwargValue::sweep(values.into_iter().map(Into::into)))
    }

    pub fn kwarg_value(mut self, name: impl Into<String>, value: KwargValue) -> Self {
        let name = name.into();
        match self.kwargs.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.kwargs.push((name, value)),
        }
        self
    }

    /// Add keyword arguments, keeping the iteration order as the sweep order
    pub fn kwargs(mut self, kwargs: impl IntoIterator<Item = (String, KwargValue)>) -> Self {
        for (name, value) in kwargs {
            self = self.kwarg_value(name, value);
        }
        self
    }

    /// Validate and assign the stage its identity
    pub fn build(self) -> PipelineResult<Arc<Stage>> {
        let invalid = |reason: String| PipelineError::InvalidStage {
            stage: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("stage name must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for key in &self.outputs {
            if !seen.insert(key) {
                return Err(invalid(format!("output {} is declared twice", key)));
            }
        }

        if let Some(arity) = self.function.arity() {
            if arity != self.inputs.len() {
                return Err(invalid(format!(
                    "function takes {} inputs but {} are declared",
                    arity,
                    self.inputs.len()
                )));
            }
        }

        for (param, value) in &self.kwargs {
            if let KwargValue::Sweep { sweep } = value {
                if sweep.is_empty() {
                    return Err(PipelineError::EmptySweep {
                        stage: self.name.clone(),
                        param: param.clone(),
                    });
                }
            }
        }

        Ok(Arc::new(Stage {
            id: StageId::next(),
            name: self.name,
            function: self.function,
            inputs: self.inputs,
            outputs: self.outputs,
            kwargs: self.kwargs,
        }))
    }
}
