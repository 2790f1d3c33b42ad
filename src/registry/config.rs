//! Dynamic configuration bags for capability factories.
//!
//! A [`Config`] is a string-keyed bag of JSON values. File-loaded (YAML) and
//! CLI-supplied (`--config '{"k": "v"}'`) settings both land here before a
//! capability's typed-config parser picks them apart. Numeric getters accept
//! both integers and floats, since JSON parsers frequently produce floats for
//! whole numbers.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::RegistryError;

/// A configuration value. Alias kept so call sites do not need to name
/// `serde_json` directly.
pub type ConfigValue = Value;

/// A dynamic string → value configuration bag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: HashMap<String, Value>,
}

impl Config {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag from an existing map.
    pub fn from_map(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Sets a key to any JSON-serializable value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Raw value lookup.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether the bag holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// String getter with default fallback.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    /// Integer getter with default fallback. Accepts floats with an exact
    /// integral value.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    i
                } else if let Some(f) = n.as_f64() {
                    f as i64
                } else {
                    default
                }
            }
            _ => default,
        }
    }

    /// Float getter with default fallback. Accepts integers.
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            _ => default,
        }
    }

    /// Boolean getter with default fallback.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            _ => default,
        }
    }

    /// String-slice getter with default fallback. Non-string elements are
    /// skipped.
    pub fn get_string_slice(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.values.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// String getter that fails when the key is absent or not a string.
    pub fn require_string(&self, key: &str) -> Result<String, RegistryError> {
        match self.values.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(RegistryError::MissingKey(key.to_string())),
        }
    }

    /// String-slice getter that fails when the key is absent or not an
    /// array of strings.
    pub fn require_string_slice(&self, key: &str) -> Result<Vec<String>, RegistryError> {
        match self.values.get(key) {
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => out.push(s.to_string()),
                        None => return Err(RegistryError::MissingKey(key.to_string())),
                    }
                }
                Ok(out)
            }
            _ => Err(RegistryError::MissingKey(key.to_string())),
        }
    }
}

impl From<HashMap<String, Value>> for Config {
    fn from(values: HashMap<String, Value>) -> Self {
        Self::from_map(values)
    }
}
