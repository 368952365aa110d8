//! Node parameters.
//!
//! Parameters arrive from the graph description as a flat mapping of tagged
//! values. The loader never interprets them; each node type-checks its own
//! parameters in `Node::configure` through the `Params` helpers, which report
//! problems as `NodeError::Config`.

use crate::pipeline::node::NodeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floats and integers both read as `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(v) => Some(v),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::String(_) => "string",
            ParamValue::List(_) => "list",
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        ParamValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Parameter mapping handed to `Node::configure`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    pub fn new(values: BTreeMap<String, ParamValue>) -> Self {
        Self { values }
    }

    /// Builder-style insertion, mostly for tests and programmatic graphs.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    fn require(&self, key: &str) -> Result<&ParamValue, NodeError> {
        self.values
            .get(key)
            .ok_or_else(|| NodeError::Config(format!("missing required parameter `{}`", key)))
    }

    fn mismatch(key: &str, expected: &str, found: &ParamValue) -> NodeError {
        NodeError::Config(format!(
            "parameter `{}` must be {}, found {}",
            key,
            expected,
            found.kind()
        ))
    }

    pub fn require_str(&self, key: &str) -> Result<&str, NodeError> {
        let value = self.require(key)?;
        value
            .as_str()
            .ok_or_else(|| Self::mismatch(key, "a string", value))
    }

    pub fn require_float(&self, key: &str) -> Result<f64, NodeError> {
        let value = self.require(key)?;
        value
            .as_float()
            .ok_or_else(|| Self::mismatch(key, "a number", value))
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, NodeError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| Self::mismatch(key, "a string", v)),
        }
    }

    pub fn float_or(&self, key: &str, default: f64) -> Result<f64, NodeError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v.as_float().ok_or_else(|| Self::mismatch(key, "a number", v)),
        }
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64, NodeError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v.as_int().ok_or_else(|| Self::mismatch(key, "an integer", v)),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, NodeError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| Self::mismatch(key, "a boolean", v)),
        }
    }

    /// A string or a list of strings, normalized to a list.
    pub fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, NodeError> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        match value {
            ParamValue::String(s) => Ok(Some(vec![s.clone()])),
            ParamValue::List(items) => items
                .iter()
                .map(|item| match item {
                    ParamValue::String(s) => Ok(s.clone()),
                    ParamValue::Int(i) => Ok(i.to_string()),
                    other => Err(Self::mismatch(key, "a list of strings", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            other => Err(Self::mismatch(key, "a string or list", other)),
        }
    }
}

impl From<BTreeMap<String, ParamValue>> for Params {
    fn from(values: BTreeMap<String, ParamValue>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::approx_constant)] // Intentionally using 3.14 as test value, not PI
    fn test_param_value_accessors() {
        assert_eq!(ParamValue::Bool(true).as_bool(), Some(true));
        assert_eq!(ParamValue::Int(42).as_int(), Some(42));
        assert_eq!(ParamValue::Int(42).as_float(), Some(42.0));
        assert_eq!(ParamValue::Float(3.14).as_float(), Some(3.14));
        assert_eq!(ParamValue::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(ParamValue::Bool(true).as_str(), None);
    }

    #[test]
    fn test_untagged_deserialization() {
        let parsed: BTreeMap<String, ParamValue> =
            serde_yaml::from_str("rate: 250\ngain: 2.5\ndebug: false\nnames: [a, b]\nlabel: eeg")
                .unwrap();
        assert_eq!(parsed["rate"], ParamValue::Int(250));
        assert_eq!(parsed["gain"], ParamValue::Float(2.5));
        assert_eq!(parsed["debug"], ParamValue::Bool(false));
        assert_eq!(parsed["names"], ParamValue::from(vec!["a", "b"]));
        assert_eq!(parsed["label"], ParamValue::from("eeg"));
    }

    #[test]
    fn test_require_reports_config_errors() {
        let params = Params::default().with("topic", 5i64);
        assert!(matches!(params.require_str("topic"), Err(NodeError::Config(_))));
        assert!(matches!(params.require_str("missing"), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let params = Params::default().with("rate", 100i64);
        assert_eq!(params.float_or("rate", 1.0).unwrap(), 100.0);
        assert_eq!(params.float_or("other", 1.5).unwrap(), 1.5);
        assert!(params.bool_or("rate", false).is_err());
    }

    #[test]
    fn test_string_list() {
        let params = Params::default()
            .with("one", "eeg")
            .with("many", vec!["eeg", "events"])
            .with("bad", 1.0);
        assert_eq!(params.string_list("one").unwrap(), Some(vec!["eeg".to_string()]));
        assert_eq!(params.string_list("many").unwrap().unwrap().len(), 2);
        assert_eq!(params.string_list("none").unwrap(), None);
        assert!(params.string_list("bad").is_err());
    }
}
