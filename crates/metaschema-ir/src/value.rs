//! Atomic values held by flag and field items

use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded atomic value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// String-like value (string, token, uri, uuid, email address, ...)
    String(String),

    /// Integer value
    Integer(i64),

    /// Decimal value
    Decimal(f64),

    /// Boolean value
    Boolean(bool),

    /// Date value
    Date(String), // ISO 8601 format

    /// DateTime value
    DateTime(String), // ISO 8601 format

    /// Raw bytes
    Binary(Vec<u8>),

    /// Rich text, kept as an unqualified XHTML fragment
    Markup(String),
}

impl Value {
    /// Short label for the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "date-time",
            Value::Binary(_) => "binary",
            Value::Markup(_) => "markup",
        }
    }

    /// Borrow the text of string-like values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Date(s) | Value::DateTime(s) | Value::Markup(s) => Some(s),
            _ => None,
        }
    }

    /// Convert value to string
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Date(d) => Some(d.clone()),
            Value::DateTime(dt) => Some(dt.clone()),
            Value::Markup(m) => Some(m.clone()),
            Value::Binary(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_string() {
            Some(s) => f.write_str(&s),
            None => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from("pc1").as_str(), Some("pc1"));
        assert_eq!(Value::from(42).as_integer(), Some(42));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(7).as_string().as_deref(), Some("7"));
        assert!(Value::Binary(vec![1, 2]).as_string().is_none());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Decimal(1.5).to_string(), "1.5");
        assert_eq!(Value::Binary(vec![]).to_string(), "<binary>");
    }

    #[test]
    fn test_value_serde() {
        let json = serde_json::to_string(&Value::Integer(3)).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Integer(3));
    }
}
