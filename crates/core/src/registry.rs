// Named stage functions that pipeline documents can refer to

use crate::stage::{StageFunction, StageOutput};
use crate::types::{Kwargs, Value};
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry mapping function names to implementations
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn StageFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the builtin numeric functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("sum", sum)
            .register("product", product)
            .register("length", length)
            .register("identity", identity)
            .register("scale", scale)
            .register("multiply", multiply)
            .register("add", add)
            .register("constant", constant);
        registry
    }

    /// Register a function, replacing any previous one with the same name
    pub fn register(&mut self, name: impl Into<String>, function: impl StageFunction + 'static) -> &mut Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn StageFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

fn number(value: &Value, what: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| anyhow!("{} must be a number, got {}", what, value))
}

fn numbers(value: &Value) -> Result<Vec<f64>> {
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("expected an array of numbers, got {}", value))?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| number(item, &format!("element {}", index)))
        .collect()
}

fn first(inputs: &[Value]) -> Result<&Value> {
    inputs.first().context("expected at least one input")
}

fn kwarg<'a>(kwargs: &'a Kwargs, name: &str) -> Result<&'a Value> {
    kwargs
        .get(name)
        .with_context(|| format!("missing keyword argument '{}'", name))
}

fn sum(inputs: &[Value], _kwargs: &Kwargs) -> Result<StageOutput> {
    let total: f64 = numbers(first(inputs)?)?.into_iter().sum();
    Ok(json!(total).into())
}

fn product(inputs: &[Value], _kwargs: &Kwargs) -> Result<StageOutput> {
    let total: f64 = numbers(first(inputs)?)?.into_iter().product();
    Ok(json!(total).into())
}

fn length(inputs: &[Value], _kwargs: &Kwargs) -> Result<StageOutput> {
    let len = match first(inputs)? {
        Value::Array(items) => items.len(),
        Value::String(text) => text.chars().count(),
        Value::Object(map) => map.len(),
        other => anyhow::bail!("cannot take the length of {}", other),
    };
    Ok(json!(len).into())
}

/// Returns its inputs unchanged, one output per input
fn identity(inputs: &[Value], _kwargs: &Kwargs) -> Result<StageOutput> {
    Ok(StageOutput::Tuple(inputs.to_vec()))
}

fn scale(inputs: &[Value], kwargs: &Kwargs) -> Result<StageOutput> {
    let x = number(first(inputs)?, "input")?;
    let factor = number(kwarg(kwargs, "factor")?, "factor")?;
    Ok(json!(x * factor).into())
}

fn multiply(inputs: &[Value], kwargs: &Kwargs) -> Result<StageOutput> {
    let x = number(first(inputs)?, "input")?;
    let y = number(kwarg(kwargs, "y")?, "y")?;
    Ok(json!(x * y).into())
}

fn add(inputs: &[Value], kwargs: &Kwargs) -> Result<StageOutput> {
    let x = number(first(inputs)?, "input")?;
    let offset = number(kwarg(kwargs, "offset")?, "offset")?;
    Ok(json!(x + offset).into())
}

fn constant(_inputs: &[Value], kwargs: &Kwargs) -> Result<StageOutput> {
    Ok(kwarg(kwargs, "value")?.clone().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(registry: &FunctionRegistry, name: &str, inputs: &[Value], kwargs: &[(&str, Value)]) -> Result<StageOutput> {
        let kwargs: Kwargs = kwargs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        registry.get(name).unwrap().call(inputs, &kwargs)
    }

    #[test]
    fn test_builtins_registered() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["add", "constant", "identity", "length", "multiply", "product", "scale", "sum"]
        );
        assert!(!registry.contains("divide"));
    }

    #[test]
    fn test_numeric_builtins() {
        let registry = FunctionRegistry::with_builtins();

        assert_eq!(
            call(&registry, "sum", &[json!([0.0, 1.0, 2.0, 3.0])], &[]).unwrap(),
            StageOutput::Single(json!(6.0))
        );
        assert_eq!(
            call(&registry, "product", &[json!([2, 3, 4])], &[]).unwrap(),
            StageOutput::Single(json!(24.0))
        );
        assert_eq!(
            call(&registry, "multiply", &[json!(6.0)], &[("y", json!(2.0))]).unwrap(),
            StageOutput::Single(json!(12.0))
        );
        assert_eq!(
            call(&registry, "add", &[json!(1)], &[("offset", json!(0.5))]).unwrap(),
            StageOutput::Single(json!(1.5))
        );
        assert_eq!(
            call(&registry, "length", &[json!("abc")], &[]).unwrap(),
            StageOutput::Single(json!(3))
        );
    }

    #[test]
    fn test_builtin_errors() {
        let registry = FunctionRegistry::with_builtins();

        let err = call(&registry, "sum", &[json!([1, "two"])], &[]).unwrap_err();
        assert!(err.to_string().contains("element 1"));

        let err = call(&registry, "scale", &[json!(1.0)], &[]).unwrap_err();
        assert!(err.to_string().contains("factor"));

        assert!(call(&registry, "sum", &[], &[]).is_err());
    }

    #[test]
    fn test_identity_and_constant() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            call(&registry, "identity", &[json!(1), json!("a")], &[]).unwrap(),
            StageOutput::Tuple(vec![json!(1), json!("a")])
        );
        assert_eq!(
            call(&registry, "constant", &[], &[("value", json!([0, 1, 2, 3]))]).unwrap(),
            StageOutput::Single(json!([0, 1, 2, 3]))
        );
    }

    #[test]
    fn test_register_custom_function() {
        let mut registry = FunctionRegistry::new();
        registry.register("negate", |inputs: &[Value], _: &Kwargs| -> Result<StageOutput> {
            Ok(json!(-inputs[0].as_f64().unwrap_or_default()).into())
        });
        assert_eq!(
            call(&registry, "negate", &[json!(2.0)], &[]).unwrap(),
            StageOutput::Single(json!(-2.0))
        );
    }
}
