use crate::types::{Kwargs, StageId, Value};
use serde::Serialize;
use std::collections::HashMap;

/// SHA-256 digest of the canonical JSON form of a stage's inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let hash = Sha256::digest(data);
        Self(hex::encode(hash))
    }

    pub fn of_inputs(inputs: &[Value]) -> Self {
        // Serializing a slice of Values cannot fail; maps are key-sorted
        let bytes = serde_json::to_vec(inputs).unwrap_or_default();
        Self::from_bytes(&bytes)
    }
}

/// What makes two executions of a stage interchangeable: the same stage, the
/// same keyword arguments and the same input values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub stage: StageId,
    pub kwargs: String,
    pub inputs: Fingerprint,
}

impl CacheKey {
    pub fn new(stage: StageId, kwargs: &Kwargs, inputs: &[Value]) -> Self {
        Self {
            stage,
            kwargs: serde_json::to_string(kwargs).unwrap_or_default(),
            inputs: Fingerprint::of_inputs(inputs),
        }
    }
}

/// Hit/miss counters for one `transform` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoized stage outputs, owned by a single `transform` call
#[derive(Debug, Default)]
pub struct ExecutionCache {
    entries: HashMap<CacheKey, Vec<Value>>,
    hits: u64,
    misses: u64,
}

impl ExecutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached outputs for `key`, counting the hit or miss
    pub fn lookup(&mut self, key: &CacheKey) -> Option<Vec<Value>> {
        match self.entries.get(key) {
            Some(outputs) => {
                self.hits += 1;
                Some(outputs.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn store(&mut self, key: CacheKey, outputs: Vec<Value>) {
        self.entries.insert(key, outputs);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(pairs: &[(&str, Value)]) -> Kwargs {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_lookup_counts_hits_and_misses() {
        let mut cache = ExecutionCache::new();
        let key = CacheKey::new(StageId(1), &Kwargs::new(), &[json!([1.0, 2.0])]);

        assert!(cache.lookup(&key).is_none());
        cache.store(key.clone(), vec![json!(3.0)]);
        assert_eq!(cache.lookup(&key), Some(vec![json!(3.0)]));

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_key_distinguishes_stage_kwargs_and_inputs() {
        let base = CacheKey::new(StageId(1), &kwargs(&[("y", json!(1.0))]), &[json!(6.0)]);

        assert_ne!(
            base,
            CacheKey::new(StageId(2), &kwargs(&[("y", json!(1.0))]), &[json!(6.0)])
        );
        assert_ne!(
            base,
            CacheKey::new(StageId(1), &kwargs(&[("y", json!(2.0))]), &[json!(6.0)])
        );
        assert_ne!(
            base,
            CacheKey::new(StageId(1), &kwargs(&[("y", json!(1.0))]), &[json!(7.0)])
        );
        assert_eq!(
            base,
            CacheKey::new(StageId(1), &kwargs(&[("y", json!(1.0))]), &[json!(6.0)])
        );
    }

    #[test]
    fn test_fingerprint_ignores_object_key_order() {
        let a = Fingerprint::of_inputs(&[json!({"a": 1, "b": 2})]);
        let b = Fingerprint::of_inputs(&[json!({"b": 2, "a": 1})]);
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 64);
    }
}
