use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "choices", rename_all = "kebab-case")]
pub enum ValueType {
    /// Any text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float.
    Float,
    /// `true/false`, `on/off`, `yes/no`, `1/0`.
    Boolean,
    /// One of a fixed set of words.
    Choice(Vec<String>),
}

impl ValueType {
    /// Converts one raw token, returning `None` when it does not fit the type.
    pub fn convert(&self, raw: &str) -> Option<ArgValue> {
        match self {
            Self::String => Some(ArgValue::String(raw.to_string())),
            Self::Integer => raw.parse::<i64>().ok().map(ArgValue::Integer),
            Self::Float => raw.parse::<f64>().ok().map(ArgValue::Float),
            Self::Boolean => parse_bool(raw).map(ArgValue::Boolean),
            Self::Choice(choices) => choices
                .iter()
                .any(|choice| choice == raw)
                .then(|| ArgValue::String(raw.to_string())),
        }
    }

    /// Returns whether an already-typed value fits this type.
    pub fn accepts(&self, value: &ArgValue) -> bool {
        match (self, value) {
            (Self::String, ArgValue::String(_)) => true,
            (Self::Integer, ArgValue::Integer(_)) => true,
            (Self::Float, ArgValue::Float(_) | ArgValue::Integer(_)) => true,
            (Self::Boolean, ArgValue::Boolean(_)) => true,
            (Self::Choice(choices), ArgValue::String(value)) => choices.contains(value),
            _ => false,
        }
    }

    /// Human-readable description used in type errors and help output.
    pub fn describe(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Float => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Choice(choices) => format!("one of {}", choices.join("|")),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// One bound argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// Boolean value, also used for flags.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Text or choice value.
    String(String),
    /// Values collected by a variadic parameter.
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Returns the text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns a float value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Returns a boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the items of a variadic value.
    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// Converts to a JSON value for structured output.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::List(values) => {
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}
