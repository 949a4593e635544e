//! The Parameter Set: string keys mapped to JSON values.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Configuration mapping a kernel is constructed with.
///
/// Keys are unique. Reads never fail: an absent key, or a value that cannot
/// be read as the requested type, resolves to the caller's default. Use
/// [`ParameterSet::require`] when a missing or mistyped value must be an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(Map<String, Value>);

impl ParameterSet {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds a parameter set from a JSON value, which must be an object.
    pub fn from_value(value: Value, source_name: &str) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ConfigError::malformed(
                source_name,
                format!("expected a JSON object at the top level, found {}", kind_of(&other)),
            )),
        }
    }

    /// Adds a key and returns the set (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value for `key` as `T`, or `default` when absent or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.0.get(key) {
            None => default,
            Some(value) => match T::deserialize(value) {
                Ok(typed) => typed,
                Err(e) => {
                    warn!("Parameter '{}' has unusable value {}: {} (using default)", key, value, e);
                    default
                }
            },
        }
    }

    /// Returns the value for `key` as `T`, failing when absent or mistyped.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self
            .0
            .get(key)
            .ok_or_else(|| ConfigError::invalid(key, "missing"))?;
        T::deserialize(value).map_err(|e| ConfigError::invalid(key, e))
    }

    /// Returns the raw JSON value for `key`.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Inserts or overwrites a key, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Merges every key of `other` into this set, overwriting on collision.
    pub fn merge(&mut self, other: ParameterSet) {
        self.0.extend(other.0);
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the underlying JSON map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Parses a `key=value` assignment.
    ///
    /// The right-hand side is read as JSON when it parses (`10`, `true`,
    /// `[1,2]`, `"quoted"`), otherwise it is kept as a plain string.
    pub fn parse_assignment(assignment: &str) -> Result<(String, Value), ConfigError> {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::invalid(assignment, "expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::invalid(assignment, "empty key"));
        }
        let value = serde_json::from_str(raw.trim())
            .unwrap_or_else(|_| Value::String(raw.trim().to_string()));
        Ok((key.to_string(), value))
    }
}

impl From<Map<String, Value>> for ParameterSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ParameterSet> for Value {
    fn from(params: ParameterSet) -> Self {
        Value::Object(params.0)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for ParameterSet {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
