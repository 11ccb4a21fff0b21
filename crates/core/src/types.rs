use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// A JSON value flowing between stages
pub type Value = serde_json::Value;

/// Resolved keyword arguments handed to a stage function
pub type Kwargs = BTreeMap<String, Value>;

/// Unique identifier for a single `transform` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a built stage. Two references share a cache entry only if
/// their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub u64);

impl StageId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of a slot in a context: a position or a name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

/// A requested result column: a data key or a sweep parameter name
pub type Column = Key;

impl Key {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Index(_) => None,
        }
    }

    /// Parse a command-line style token: digits become an index
    pub fn parse_token(token: &str) -> Self {
        match token.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(token.to_string()),
        }
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// A keyword argument as declared on a stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KwargValue {
    /// A sweep dimension: one execution per value
    Sweep { sweep: Vec<Value> },
    /// Passed through unchanged, even if it is an array
    Fixed(Value),
}

impl KwargValue {
    pub fn sweep(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Sweep {
            sweep: values.into_iter().collect(),
        }
    }

    pub fn is_sweep(&self) -> bool {
        matches!(self, Self::Sweep { .. })
    }
}

// Only an object of the exact form `{ "sweep": [..] }` marks a sweep dimension.
impl<'de> Deserialize<'de> for KwargValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Object(mut map) if map.len() == 1 && map.contains_key("sweep") => {
                match map.remove("sweep") {
                    Some(Value::Array(sweep)) => Ok(Self::Sweep { sweep }),
                    _ => Err(serde::de::Error::custom("'sweep' must be an array of values")),
                }
            }
            other => Ok(Self::Fixed(other)),
        }
    }
}

impl From<Value> for KwargValue {
    fn from(value: Value) -> Self {
        Self::Fixed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ordering_puts_indices_first() {
        let mut keys = vec![Key::name("y"), Key::Index(3), Key::name("a"), Key::Index(0)];
        keys.sort();
        assert_eq!(
            keys,
            vec![Key::Index(0), Key::Index(3), Key::name("a"), Key::name("y")]
        );
    }

    #[test]
    fn test_key_deserializes_untagged() {
        let keys: Vec<Key> = serde_json::from_value(json!([0, "named_output", 3])).unwrap();
        assert_eq!(
            keys,
            vec![Key::Index(0), Key::name("named_output"), Key::Index(3)]
        );
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(Key::parse_token("12"), Key::Index(12));
        assert_eq!(Key::parse_token("y"), Key::name("y"));
        assert_eq!(Key::parse_token("-1"), Key::name("-1"));
    }

    #[test]
    fn test_kwarg_value_sweep_marker() {
        let sweep: KwargValue = serde_json::from_value(json!({"sweep": [1.0, 2.0]})).unwrap();
        assert!(sweep.is_sweep());

        // A plain array is an ordinary argument, not a sweep
        let fixed: KwargValue = serde_json::from_value(json!([[1.0, 2.0]])).unwrap();
        assert_eq!(fixed, KwargValue::Fixed(json!([[1.0, 2.0]])));

        let bad: Result<KwargValue, _> = serde_json::from_value(json!({"sweep": 1.0}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_stage_ids_are_unique() {
        let a = StageId::next();
        let b = StageId::next();
        assert_ne!(a, b);
    }
}
