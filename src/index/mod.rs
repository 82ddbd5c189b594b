//! Index management.
//!
//! Secondary indexes are keyed by (index name, key, value) and point at
//! graph elements. Numeric values are wrapped so that range queries work
//! independently of whether the property was an integer or a float.

use serde::{Deserialize, Serialize};

use crate::model::Value;

/// Type of index to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexType {
    /// Exact-match index; numeric entries also answer range queries.
    #[default]
    Exact,
    /// Full-text search index over tokenized string values.
    FullText,
}

/// A value as stored in an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexValue {
    Exact(Value),
    Numeric(f64),
}

impl IndexValue {
    /// Wrap a property value for indexing. Integers and floats become
    /// [`IndexValue::Numeric`].
    pub fn wrap(value: &Value) -> Self {
        match value {
            Value::Int(i) => IndexValue::Numeric(*i as f64),
            Value::Float(f) => IndexValue::Numeric(*f),
            other => IndexValue::Exact(other.clone()),
        }
    }

    /// Whether this entry answers an exact lookup for `value`.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (IndexValue::Numeric(n), Value::Int(i)) => *n == *i as f64,
            (IndexValue::Numeric(n), Value::Float(f)) => *n == *f,
            (IndexValue::Exact(v), other) => v == other,
            _ => false,
        }
    }
}

/// A query against one key of an index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexQuery {
    /// Exact value match.
    Exact(Value),
    /// Inclusive numeric range; `None` bounds are open.
    Range { min: Option<f64>, max: Option<f64> },
    /// Full-text term (case-insensitive token match).
    Term(String),
}

/// Split a string into lower-cased full-text tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
