//! Typed values carried through task contexts and emitted records.
//!
//! The context bag and the record both map string keys to [`Value`], a small
//! tagged union instead of an untyped `any`. Reading a key with the wrong
//! expected type surfaces as a `ContextTypeMismatch` for that task alone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A flat mapping of field name to value, emitted by a terminal parse step.
///
/// `BTreeMap` keeps field order deterministic for replay and fixtures.
pub type Record = BTreeMap<String, Value>;

/// A context or record value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// A small tuple, e.g. an inclusive-exclusive loop bound pair.
    Pair(i64, i64),
}

impl Value {
    /// The name of the variant, used in type-mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Pair(_, _) => "pair",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<(i64, i64)> {
        match self {
            Value::Pair(a, b) => Some((*a, *b)),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<(i64, i64)> for Value {
    fn from(p: (i64, i64)) -> Self {
        Value::Pair(p.0, p.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_round_trip() {
        assert_eq!(Value::from(42).as_int(), Some(42));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(2.5).as_float(), Some(2.5));
        assert_eq!(Value::from((2, 7)).as_pair(), Some((2, 7)));
        assert_eq!(Value::from(true).as_bool(), Some(true));
    }

    #[test]
    fn int_widens_to_float_but_not_back() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Float(3.0).as_int(), None);
    }

    #[test]
    fn untagged_json_shape() {
        let mut record = Record::new();
        record.insert("play_count".into(), Value::Int(150_000_000));
        record.insert("name".into(), Value::Str("some title".into()));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"name":"some title","play_count":150000000}"#);
    }
}
