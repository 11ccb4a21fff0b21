// Declarative pipeline documents (TOML or JSON) resolved against a function registry

use crate::chain::ChainTemplate;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::Pipeline;
use crate::registry::FunctionRegistry;
use crate::stage::{Stage, StageBuilder};
use crate::types::{Key, KwargValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// A pipeline as written in a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDocument {
    /// Stage definitions by name. A name used in several chains denotes the
    /// same stage.
    #[serde(default)]
    pub stages: BTreeMap<String, StageDocument>,

    pub chains: Vec<Vec<SlotDocument>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDocument {
    /// Name of a function in the registry
    pub function: String,

    #[serde(default, rename = "in")]
    pub inputs: Vec<Key>,

    #[serde(default, rename = "out")]
    pub outputs: Vec<Key>,

    /// Keyword arguments in the order they are written
    #[serde(default, with = "ordered_kwargs")]
    pub kwargs: Vec<(String, KwargValue)>,
}

/// One position in a chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotDocument {
    Stage(String),
    OneOf { one_of: Vec<AlternativeDocument> },
}

/// One alternative of a `one_of` slot: a stage or a run of stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlternativeDocument {
    Stage(String),
    Sequence(Vec<String>),
}

// Tables read as maps would lose the written order, which is the sweep order.
mod ordered_kwargs {
    use crate::types::KwargValue;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(kwargs: &[(String, KwargValue)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(kwargs.len()))?;
        for (name, value) in kwargs {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, KwargValue)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct KwargsVisitor;

        impl<'de> Visitor<'de> for KwargsVisitor {
            type Value = Vec<(String, KwargValue)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of keyword arguments")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut kwargs: Vec<(String, KwargValue)> = Vec::new();
                while let Some((name, value)) = access.next_entry::<String, KwargValue>()? {
                    if kwargs.iter().any(|(existing, _)| *existing == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate keyword argument '{}'",
                            name
                        )));
                    }
                    kwargs.push((name, value));
                }
                Ok(kwargs)
            }
        }

        deserializer.deserialize_map(KwargsVisitor)
    }
}

impl PipelineDocument {
    /// Read a document, choosing JSON for `.json` files and TOML otherwise
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Document(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }

    pub fn from_toml(content: &str) -> PipelineResult<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Document(format!("Failed to parse TOML pipeline: {}", e)))
    }

    pub fn from_json(content: &str) -> PipelineResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| PipelineError::Document(format!("Failed to parse JSON pipeline: {}", e)))
    }

    /// Build every stage once, then assemble the chains from them
    pub fn build(&self, registry: &FunctionRegistry) -> PipelineResult<Pipeline> {
        let mut stages: BTreeMap<&str, Arc<Stage>> = BTreeMap::new();
        for (name, definition) in &self.stages {
            let function = registry.get(&definition.function).ok_or_else(|| {
                PipelineError::Document(format!(
                    "Stage '{}' uses unknown function '{}'",
                    name, definition.function
                ))
            })?;

            let stage = StageBuilder::new(name.clone(), function)
                .inputs(definition.inputs.iter().cloned())
                .outputs(definition.outputs.iter().cloned())
                .kwargs(definition.kwargs.clone())
                .build()?;
            stages.insert(name.as_str(), stage);
        }

        let lookup = |name: &str| {
            stages.get(name).cloned().ok_or_else(|| {
                PipelineError::Document(format!("Chain refers to undefined stage '{}'", name))
            })
        };

        let mut templates = Vec::with_capacity(self.chains.len());
        for slots in &self.chains {
            let mut template = ChainTemplate::new();
            for slot in slots {
                template = match slot {
                    SlotDocument::Stage(name) => template.then(lookup(name)?),
                    SlotDocument::OneOf { one_of } => template.one_of_sequences(
                        one_of
                            .iter()
                            .map(|alternative| -> PipelineResult<Vec<Arc<Stage>>> {
                                match alternative {
                                    AlternativeDocument::Stage(name) => Ok(vec![lookup(name)?]),
                                    AlternativeDocument::Sequence(names) => {
                                        names.iter().map(|name| lookup(name)).collect()
                                    }
                                }
                            })
                            .collect::<PipelineResult<_>>()?,
                    ),
                };
            }
            templates.push(template);
        }

        let pipeline = Pipeline::from_templates(&templates)?;
        tracing::debug!(
            "Built pipeline from document: {} stages, {} chains",
            stages.len(),
            pipeline.chains().len()
        );
        Ok(pipeline)
    }
}
