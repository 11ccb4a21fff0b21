// Result contexts and the filtering/flattening view over them

use crate::types::{Column, Key, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// A projected view of one result context
pub type Row = BTreeMap<Key, Value>;

/// Results grouped by chain (outer) and binding (inner)
pub type ResultSet = Vec<Vec<ResultContext>>;

/// Everything one chain produced under one binding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultContext {
    chain_index: usize,
    binding_index: usize,
    values: BTreeMap<Key, Value>,
    params: BTreeMap<String, Value>,
}

impl ResultContext {
    pub(crate) fn new(
        chain_index: usize,
        binding_index: usize,
        values: BTreeMap<Key, Value>,
        params: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            chain_index,
            binding_index,
            values,
            params,
        }
    }

    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    pub fn binding_index(&self) -> usize {
        self.binding_index
    }

    /// Data keys: dataset slots, named inputs and stage outputs
    pub fn values(&self) -> &BTreeMap<Key, Value> {
        &self.values
    }

    /// Sweep parameters exercised on this path and their chosen values
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// Look up a data key, falling back to sweep parameters for names
    pub fn get(&self, column: &Column) -> Option<&Value> {
        self.values.get(column).or_else(|| match column {
            Key::Name(name) => self.params.get(name),
            Key::Index(_) => None,
        })
    }

    pub fn contains(&self, column: &Column) -> bool {
        self.get(column).is_some()
    }

    /// Only the requested columns present in this context, values unchanged
    pub fn project(&self, columns: &[Column]) -> Row {
        columns
            .iter()
            .filter_map(|column| self.get(column).map(|value| (column.clone(), value.clone())))
            .collect()
    }

    /// Every data key and sweep parameter as a single row
    pub fn to_row(&self) -> Row {
        let mut row = self.values.clone();
        for (name, value) in &self.params {
            row.entry(Key::Name(name.clone())).or_insert_with(|| value.clone());
        }
        row
    }

    /// Like [`ResultContext::to_row`], with the entries of nested objects
    /// (and of objects inside arrays) lifted to the top level.
    ///
    /// Keys already present win, so outer values are never replaced and
    /// shallower nested entries win over deeper ones.
    pub fn to_lifted_row(&self) -> Row {
        let mut row = self.to_row();
        let outer: Vec<Value> = row.values().cloned().collect();
        for value in &outer {
            lift_into(&mut row, value);
        }
        row
    }
}

fn lift_into(row: &mut Row, value: &Value) {
    match value {
        Value::Object(map) => {
            for (name, inner) in map {
                row.entry(Key::parse_token(name))
                    .or_insert_with(|| inner.clone());
            }
            for inner in map.values() {
                lift_into(row, inner);
            }
        }
        Value::Array(items) => {
            for item in items {
                lift_into(row, item);
            }
        }
        _ => {}
    }
}

fn select(row: Row, columns: Option<&[Column]>) -> Row {
    match columns {
        Some(columns) => columns
            .iter()
            .filter_map(|column| row.get(column).map(|value| (column.clone(), value.clone())))
            .collect(),
        None => row,
    }
}

/// Output of [`filter_results`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilteredResults {
    Nested(Vec<Vec<Row>>),
    Flat(Vec<Row>),
}

impl FilteredResults {
    /// All rows in chain order, then binding order
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Nested(groups) => groups.into_iter().flatten().collect(),
            Self::Flat(rows) => rows,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Nested(groups) => groups.iter().map(Vec::len).sum(),
            Self::Flat(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Project every context to `columns` and optionally drop the chain grouping.
///
/// `None` keeps every column. Requested columns a context lacks are omitted
/// from its row. Never fails: empty inputs produce empty output.
pub fn filter_results(results: &ResultSet, columns: Option<&[Column]>, flatten: bool) -> FilteredResults {
    group(results, flatten, |context| match columns {
        Some(columns) => context.project(columns),
        None => context.to_row(),
    })
}

/// [`filter_results`] over lifted rows, so keys inside nested values (such as
/// the rows of a pipeline run as a stage) can be selected as columns.
pub fn filter_results_lifted(results: &ResultSet, columns: Option<&[Column]>, flatten: bool) -> FilteredResults {
    group(results, flatten, |context| select(context.to_lifted_row(), columns))
}

fn group<F>(results: &ResultSet, flatten: bool, view: F) -> FilteredResults
where
    F: Fn(&ResultContext) -> Row,
{
    if flatten {
        FilteredResults::Flat(results.iter().flatten().map(&view).collect())
    } else {
        FilteredResults::Nested(
            results
                .iter()
                .map(|group| group.iter().map(&view).collect())
                .collect(),
        )
    }
}
