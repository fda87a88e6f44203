use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Runtime value produced by expression evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// The null value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(HashMap<String, Value>),
}

impl Value {
    /// Convert a `serde_json::Value` into a runtime `Value`.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Null
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => {
                Self::List(arr.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(obj) => Self::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Returns the rule-language name of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null_type",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "double",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Select a field on a map value.
    pub(crate) fn field(&self, name: &str) -> Result<Self, RuleError> {
        match self {
            Self::Map(m) => m
                .get(name)
                .cloned()
                .ok_or_else(|| RuleError::NoSuchKey(name.to_owned())),
            _ => Err(RuleError::TypeError(format!(
                "cannot select field '{name}' on {}",
                self.type_name()
            ))),
        }
    }

    /// Test whether a field is set on a map value.
    pub(crate) fn has_field(&self, name: &str) -> Result<bool, RuleError> {
        match self {
            Self::Map(m) => Ok(m.contains_key(name)),
            _ => Err(RuleError::TypeError(format!(
                "invalid type for field selection: {}",
                self.type_name()
            ))),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_nested() {
        let json = serde_json::json!({
            "key-one": {"key-two": "value"},
            "n": 3,
            "f": 1.5,
            "list": [true, null]
        });
        let Value::Map(m) = Value::from_json(json) else {
            panic!("expected map");
        };
        assert_eq!(m["n"], Value::Int(3));
        assert_eq!(m["f"], Value::Float(1.5));
        assert_eq!(m["list"], Value::List(vec![Value::Bool(true), Value::Null]));
        assert_eq!(
            m["key-one"].field("key-two").unwrap(),
            Value::String("value".into())
        );
    }

    #[test]
    fn missing_field_is_no_such_key() {
        let v = Value::Map(HashMap::new());
        assert_eq!(v.field("x"), Err(RuleError::NoSuchKey("x".into())));
        assert_eq!(v.has_field("x"), Ok(false));
    }

    #[test]
    fn field_on_scalar_is_type_error() {
        let v = Value::from("abc");
        assert!(matches!(v.field("x"), Err(RuleError::TypeError(_))));
        assert!(v.has_field("x").is_err());
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Float(1.0).type_name(), "double");
        assert_eq!(Value::Null.type_name(), "null_type");
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(1).as_bool(), None);
    }
}
