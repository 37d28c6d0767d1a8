//! Node and link parameter strings.
//!
//! Parameters arrive as JSON object text, e.g.
//! `{"outputElementCount": 3, "delta": 0.5}`. The empty string means no
//! parameters.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A single parameter value, as stored in a [`ValueMap`] and exchanged with
/// [`crate::RegionImpl::get_parameter`] / [`crate::RegionImpl::set_parameter`].
pub type ParamValue = Value;

/// Extract a typed value for parameter `key`, naming it on a type mismatch.
pub fn convert<T>(key: &str, value: &Value, extract: impl Fn(&Value) -> Option<T>, expected: &str) -> Result<T> {
    extract(value).ok_or_else(|| Error::InvalidArgument(format!("parameter '{key}' must be {expected}, got {value}")))
}

/// Parsed key/value parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueMap(Map<String, Value>);

impl ValueMap {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::InvalidArgument(format!(
                "parameters must be a JSON object, got '{other}'"
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        self.typed(key, default, Value::as_u64, "an unsigned integer")
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> Result<f64> {
        self.typed(key, default, Value::as_f64, "a number")
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        self.typed(key, default, Value::as_bool, "a boolean")
    }

    pub fn get_str_or(&self, key: &str, default: &str) -> Result<String> {
        self.typed(key, default.to_string(), |value| value.as_str().map(str::to_string), "a string")
    }

    /// A scalar or array of unsigned integers, always returned as a list.
    pub fn get_u64_list(&self, key: &str) -> Result<Option<Vec<u64>>> {
        let Some(value) = self.0.get(key) else {
            return Ok(None);
        };
        let wrong_type =
            || Error::InvalidArgument(format!("parameter '{key}' must be an unsigned integer or a list of them"));
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().ok_or_else(wrong_type))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            scalar => scalar.as_u64().map(|v| Some(vec![v])).ok_or_else(wrong_type),
        }
    }

    /// Deserialize the whole map into a typed parameter struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    fn typed<T>(&self, key: &str, default: T, extract: impl Fn(&Value) -> Option<T>, expected: &str) -> Result<T> {
        match self.0.get(key) {
            None => Ok(default),
            Some(value) => convert(key, value, extract, expected),
        }
    }
}
