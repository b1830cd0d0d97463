use serde_json::{Number, Value};
use std::collections::BTreeMap;

use crate::models::PassageMetadata;

/// A single equality clause. Values that cannot be compared as text
/// (null, arrays, objects) never match anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterValue {
    Exact(String),
    Unmatchable,
}

/// Conjunction of `metadata[key] == value` clauses. Empty keeps everything.
///
/// Clauses are held in a `BTreeMap` so iteration order is the sorted key
/// order, which is what the cache key relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MetadataFilter {
    clauses: BTreeMap<String, FilterValue>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses
            .insert(key.into(), FilterValue::Exact(value.into()));
        self
    }

    /// Build from a loosely-typed JSON map. Scalars compare by their text form.
    pub fn from_json(map: &BTreeMap<String, Value>) -> Self {
        let clauses = map
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => FilterValue::Exact(s.clone()),
                    Value::Number(n) => FilterValue::Exact(number_text(n)),
                    Value::Bool(b) => FilterValue::Exact(b.to_string()),
                    _ => {
                        tracing::warn!("metadata_filter value for '{k}' is not a scalar; it will match nothing");
                        FilterValue::Unmatchable
                    }
                };
                (k.clone(), value)
            })
            .collect();
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Clauses in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.clauses.iter()
    }

    pub fn matches(&self, metadata: &PassageMetadata) -> bool {
        self.clauses.iter().all(|(key, expected)| match expected {
            FilterValue::Exact(v) => metadata.value_text(key).as_deref() == Some(v.as_str()),
            FilterValue::Unmatchable => false,
        })
    }
}

/// Text form of a JSON number. Integral floats print as integers, so `3.0` and `3` agree.
pub fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}
