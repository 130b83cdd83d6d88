//! Script parameters and their `--key value` marshaling.

use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::policy::Mode;

/// The only value shapes a script can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl ParamValue {
    /// Converts a JSON value. Null, arrays and objects have no script form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::Bool(b) => Value::Bool(*b),
        }
    }
}

/// Ordered script parameters. Insertion order is argument order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptParams {
    entries: Vec<(String, ParamValue)>,
}

impl ScriptParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets a parameter. An existing key keeps its position.
    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps the primitive entries of a JSON object, in the order the caller
    /// wrote them (`serde_json` is built with `preserve_order`).
    pub fn from_json(object: &Map<String, Value>) -> Self {
        let mut params = Self::new();
        for (key, value) in object {
            match ParamValue::from_json(value) {
                Some(v) => params.insert(key, v),
                None => debug!("Dropping non-primitive script parameter '{key}'"),
            }
        }
        params
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// `--mode <mode>` followed by `--<key> <value>` for each parameter.
pub fn build_args(mode: Mode, params: &ScriptParams) -> Vec<String> {
    let mut args = Vec::with_capacity(2 + params.len() * 2);
    args.push("--mode".to_string());
    args.push(mode.to_string());
    for (key, value) in params.iter() {
        args.push(format!("--{key}"));
        args.push(value.to_string());
    }
    args
}
