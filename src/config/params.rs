//! Typed connection parameters
//!
//! Sources carry a free-form key/value parameter map in the database. The map
//! is validated into this type when the source record is loaded, so a bad
//! value fails the owning operation up front with a structured error instead
//! of surfacing as a deferred parse failure inside a connector call.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::{ErrorCategory, ErrorClassification};

/// Connection parameter errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("Connection parameters are not a JSON object: {0}")]
    NotAnObject(String),

    #[error("Connection parameter {key} is not a string value")]
    NotAString { key: String },

    #[error("Missing connection parameter: {key}")]
    Missing { key: String },

    #[error("Connection parameter {key} is not a valid {expected}: {value}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        value: String,
    },
}

impl ErrorClassification for ParamsError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Validated connection parameters for a source connector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    values: BTreeMap<String, String>,
}

impl ConnectionParams {
    /// Build from a JSON value as stored on the source record.
    ///
    /// Every entry must be a string; anything else is a configuration defect
    /// in the stored record.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ParamsError> {
        let map = value
            .as_object()
            .ok_or_else(|| ParamsError::NotAnObject(value.to_string()))?;

        let mut values = BTreeMap::new();
        for (key, v) in map {
            let s = v
                .as_str()
                .ok_or_else(|| ParamsError::NotAString { key: key.clone() })?;
            values.insert(key.clone(), s.to_string());
        }

        Ok(Self { values })
    }

    /// Build from key/value pairs (useful for tests)
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get a required string parameter
    pub fn get(&self, key: &str) -> Result<&str, ParamsError> {
        self.values
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| ParamsError::Missing {
                key: key.to_string(),
            })
    }

    /// Get an optional string parameter
    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Get a required decimal parameter
    pub fn get_decimal(&self, key: &str) -> Result<Decimal, ParamsError> {
        let raw = self.get(key)?;
        raw.parse().map_err(|_| ParamsError::InvalidValue {
            key: key.to_string(),
            expected: "decimal",
            value: raw.to_string(),
        })
    }

    /// Get a required boolean parameter ("true"/"false")
    pub fn get_bool(&self, key: &str) -> Result<bool, ParamsError> {
        let raw = self.get(key)?;
        match raw {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ParamsError::InvalidValue {
                key: key.to_string(),
                expected: "boolean",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"host": "broker.example", "point": "0.00001"});
        let params = ConnectionParams::from_json(&json).unwrap();
        assert_eq!(params.get("host").unwrap(), "broker.example");
        assert_eq!(params.get_decimal("point").unwrap(), dec!(0.00001));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(matches!(
            ConnectionParams::from_json(&serde_json::json!("host=x")),
            Err(ParamsError::NotAnObject(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_non_string_values() {
        let json = serde_json::json!({"port": 5432});
        assert!(matches!(
            ConnectionParams::from_json(&json),
            Err(ParamsError::NotAString { .. })
        ));
    }

    #[test]
    fn test_missing_and_invalid() {
        let params = ConnectionParams::from_pairs([("timeout", "abc")]);
        assert!(matches!(
            params.get("host"),
            Err(ParamsError::Missing { .. })
        ));
        assert!(matches!(
            params.get_decimal("timeout"),
            Err(ParamsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_get_bool() {
        let params = ConnectionParams::from_pairs([("demo", "true"), ("live", "no")]);
        assert_eq!(params.get_bool("demo").unwrap(), true);
        assert!(params.get_bool("live").is_err());
    }
}
