//! Dynamically shaped values
//!
//! Remote calls answer with nested tables whose shape is only known at runtime,
//! and metric configuration carries scalars of mixed type (bucket values may be
//! strings or integers). Both are modelled with [`Value`], which exposes
//! fallible accessors instead of assuming a shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single row (or structure) of a remote response: field name to value
pub type Row = BTreeMap<String, Value>;

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Row),
}

/// Shape mismatch when accessing a [`Value`]
#[derive(Debug, Clone, PartialEq)]
pub struct ValueError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ValueError {}

impl Value {
    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_map(&self) -> Result<&Row, ValueError> {
        match self {
            Value::Map(row) => Ok(row),
            other => Err(other.mismatch("map")),
        }
    }

    /// Interpret the value as a table, i.e. a list of rows.
    ///
    /// Fails if the value is not a list or if any element is not a map.
    pub fn as_table(&self) -> Result<Vec<&Row>, ValueError> {
        match self {
            Value::List(items) => items
                .iter()
                .map(|item| item.as_map().map_err(|_| item.mismatch("table row")))
                .collect(),
            other => Err(other.mismatch("table")),
        }
    }

    /// Textual form usable as part of a label or for comparisons.
    ///
    /// Only strings and integers have one; everything else yields `None`.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<Row> for Value {
    fn from(value: Row) -> Self {
        Value::Map(value)
    }
}

/// Look up a field of a row.
///
/// Remote field names arrive upper-cased, so the upper-cased name is tried
/// first before falling back to a case-insensitive scan.
pub fn field<'a>(row: &'a Row, name: &str) -> Option<&'a Value> {
    row.get(&name.to_uppercase()).or_else(|| {
        row.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}
