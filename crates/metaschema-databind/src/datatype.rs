//! Datatype adapters: codecs for atomic values
//!
//! Each adapter converts between the lexical form of one named datatype and
//! a [`Value`]. Text is the shared form for XML attributes and element
//! content; JSON gets native numbers and booleans where the datatype has them.

use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use metaschema_ir::Value;
use metaschema_xml::{XmlElement, fragment_to_string, parse_fragment};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// JSON property name of a flagged field's value when none is configured
pub const DEFAULT_JSON_VALUE_KEY: &str = "STRVALUE";

/// Same as [`DEFAULT_JSON_VALUE_KEY`] for markup datatypes
pub const MARKUP_JSON_VALUE_KEY: &str = "RICHTEXT";

/// Codec for one named atomic datatype
pub trait DataTypeAdapter: Send + Sync + fmt::Debug {
    /// Datatype name as used by `as-type`
    fn name(&self) -> &str;

    /// Decode the lexical form
    fn parse(&self, text: &str) -> Result<Value>;

    /// Encode to the lexical form
    fn format(&self, value: &Value) -> Result<String>;

    /// Whether values are plain scalars rather than structured content
    fn is_atomic(&self) -> bool {
        true
    }

    fn default_json_value_key(&self) -> &'static str {
        DEFAULT_JSON_VALUE_KEY
    }

    /// Whether a field of this type may omit its wrapper element in XML
    fn is_xml_unwrapped_allowed(&self) -> bool {
        false
    }

    /// Whether XML content may interleave text and elements
    fn is_xml_mixed(&self) -> bool {
        false
    }

    fn read_json(&self, json: &JsonValue) -> Result<Value> {
        match json {
            JsonValue::String(s) => self.parse(s),
            JsonValue::Number(n) => self.parse(&n.to_string()),
            JsonValue::Bool(b) => self.parse(&b.to_string()),
            other => Err(Error::adapter(
                self.name(),
                format!("expected a scalar, found {}", json_kind(other)),
            )),
        }
    }

    fn write_json(&self, value: &Value) -> Result<JsonValue> {
        Ok(JsonValue::String(self.format(value)?))
    }

    /// Decode the content of an element
    fn read_xml(&self, element: &XmlElement) -> Result<Value> {
        self.parse(&element.text())
    }

    /// Encode into the content of an element
    fn write_xml(&self, value: &Value, element: &mut XmlElement) -> Result<()> {
        element.push_text(self.format(value)?);
        Ok(())
    }
}

pub(crate) fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn mismatch(data_type: &str, value: &Value) -> Error {
    Error::adapter(
        data_type,
        format!("cannot encode a {} value", value.type_name()),
    )
}

/// Lexical checks applied by string-valued datatypes
#[derive(Debug)]
enum Lexical {
    Any,
    Pattern(&'static str, OnceLock<std::result::Result<Regex, regex::Error>>),
    Uri,
    Uuid,
}

impl Lexical {
    fn pattern(pattern: &'static str) -> Self {
        Self::Pattern(pattern, OnceLock::new())
    }

    fn check(&self, data_type: &str, text: &str) -> Result<()> {
        let valid = match self {
            Self::Any => true,
            Self::Pattern(pattern, compiled) => compiled
                .get_or_init(|| Regex::new(pattern))
                .as_ref()
                .map_err(|e| Error::adapter(data_type, format!("bad pattern: {}", e)))?
                .is_match(text),
            Self::Uri => url::Url::parse(text).is_ok(),
            Self::Uuid => uuid::Uuid::parse_str(text).is_ok(),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::adapter(data_type, format!("'{}' is not lexically valid", text)))
        }
    }
}

/// String-valued datatypes distinguished only by their lexical rules
#[derive(Debug)]
pub struct StringAdapter {
    name: &'static str,
    lexical: Lexical,
}

impl StringAdapter {
    pub fn string() -> Self {
        Self { name: "string", lexical: Lexical::pattern(r"(?s)^\S(.*\S)?$") }
    }

    pub fn token() -> Self {
        Self { name: "token", lexical: Lexical::pattern(r"^(\p{L}|_)(\p{L}|\p{N}|[.\-_])*$") }
    }

    pub fn uri() -> Self {
        Self { name: "uri", lexical: Lexical::Uri }
    }

    pub fn uri_reference() -> Self {
        Self { name: "uri-reference", lexical: Lexical::pattern(r"^\S*$") }
    }

    pub fn uuid() -> Self {
        Self { name: "uuid", lexical: Lexical::Uuid }
    }

    pub fn email_address() -> Self {
        Self { name: "email-address", lexical: Lexical::pattern(r"^[^@\s]+@[^@\s]+$") }
    }

    /// Any text, unchecked
    pub fn unchecked(name: &'static str) -> Self {
        Self { name, lexical: Lexical::Any }
    }
}

impl DataTypeAdapter for StringAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn parse(&self, text: &str) -> Result<Value> {
        self.lexical.check(self.name, text)?;
        Ok(Value::String(text.to_string()))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(mismatch(self.name, other)),
        }
    }
}

/// Integers with an optional lower bound
#[derive(Debug)]
pub struct IntegerAdapter {
    name: &'static str,
    min: Option<i64>,
}

impl IntegerAdapter {
    pub fn integer() -> Self {
        Self { name: "integer", min: None }
    }

    pub fn non_negative() -> Self {
        Self { name: "non-negative-integer", min: Some(0) }
    }

    pub fn positive() -> Self {
        Self { name: "positive-integer", min: Some(1) }
    }

    fn checked(&self, n: i64) -> Result<Value> {
        match self.min {
            Some(min) if n < min => Err(Error::adapter(
                self.name,
                format!("{} is less than {}", n, min),
            )),
            _ => Ok(Value::Integer(n)),
        }
    }
}

impl DataTypeAdapter for IntegerAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn parse(&self, text: &str) -> Result<Value> {
        let n = text
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::adapter(self.name, format!("'{}': {}", text, e)))?;
        self.checked(n)
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Integer(n) => Ok(n.to_string()),
            other => Err(mismatch(self.name, other)),
        }
    }

    fn read_json(&self, json: &JsonValue) -> Result<Value> {
        match json {
            JsonValue::Number(n) => match n.as_i64() {
                Some(n) => self.checked(n),
                None => Err(Error::adapter(self.name, format!("{} is not an integer", n))),
            },
            JsonValue::String(s) => self.parse(s),
            other => Err(Error::adapter(
                self.name,
                format!("expected a number, found {}", json_kind(other)),
            )),
        }
    }

    fn write_json(&self, value: &Value) -> Result<JsonValue> {
        match value {
            Value::Integer(n) => Ok(JsonValue::from(*n)),
            other => Err(mismatch(self.name, other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct DecimalAdapter;

impl DataTypeAdapter for DecimalAdapter {
    fn name(&self) -> &str {
        "decimal"
    }

    fn parse(&self, text: &str) -> Result<Value> {
        text.trim()
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite())
            .map(Value::Decimal)
            .ok_or_else(|| Error::adapter("decimal", format!("'{}' is not a decimal", text)))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Decimal(d) => Ok(d.to_string()),
            Value::Integer(n) => Ok(n.to_string()),
            other => Err(mismatch("decimal", other)),
        }
    }

    fn read_json(&self, json: &JsonValue) -> Result<Value> {
        match json {
            JsonValue::Number(n) => n
                .as_f64()
                .map(Value::Decimal)
                .ok_or_else(|| Error::adapter("decimal", format!("{} is out of range", n))),
            JsonValue::String(s) => self.parse(s),
            other => Err(Error::adapter(
                "decimal",
                format!("expected a number, found {}", json_kind(other)),
            )),
        }
    }

    fn write_json(&self, value: &Value) -> Result<JsonValue> {
        match value {
            Value::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(JsonValue::Number)
                .ok_or_else(|| Error::adapter("decimal", format!("{} is not finite", d))),
            Value::Integer(n) => Ok(JsonValue::from(*n)),
            other => Err(mismatch("decimal", other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct BooleanAdapter;

impl DataTypeAdapter for BooleanAdapter {
    fn name(&self) -> &str {
        "boolean"
    }

    fn parse(&self, text: &str) -> Result<Value> {
        match text.trim() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            other => Err(Error::adapter("boolean", format!("'{}' is not a boolean", other))),
        }
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Boolean(b) => Ok(b.to_string()),
            other => Err(mismatch("boolean", other)),
        }
    }

    fn read_json(&self, json: &JsonValue) -> Result<Value> {
        match json {
            JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
            JsonValue::String(s) => self.parse(s),
            other => Err(Error::adapter(
                "boolean",
                format!("expected a boolean, found {}", json_kind(other)),
            )),
        }
    }

    fn write_json(&self, value: &Value) -> Result<JsonValue> {
        match value {
            Value::Boolean(b) => Ok(JsonValue::Bool(*b)),
            other => Err(mismatch("boolean", other)),
        }
    }
}

/// Calendar dates, optionally with a timezone offset
#[derive(Debug, Default)]
pub struct DateAdapter;

impl DataTypeAdapter for DateAdapter {
    fn name(&self) -> &str {
        "date"
    }

    fn parse(&self, text: &str) -> Result<Value> {
        let text = text.trim();
        let date_part = text.get(..10).unwrap_or(text);
        let zone = &text[date_part.len()..];
        let zone_ok = zone.is_empty()
            || zone == "Z"
            || chrono::DateTime::parse_from_rfc3339(&format!("{}T00:00:00{}", date_part, zone))
                .is_ok();
        match chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
            Ok(_) if zone_ok => Ok(Value::Date(text.to_string())),
            _ => Err(Error::adapter("date", format!("'{}' is not a date", text))),
        }
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Date(d) => Ok(d.clone()),
            other => Err(mismatch("date", other)),
        }
    }
}

/// Timestamps, with or without a timezone offset
#[derive(Debug, Default)]
pub struct DateTimeAdapter;

impl DataTypeAdapter for DateTimeAdapter {
    fn name(&self) -> &str {
        "date-time"
    }

    fn parse(&self, text: &str) -> Result<Value> {
        let text = text.trim();
        let valid = chrono::DateTime::parse_from_rfc3339(text).is_ok()
            || chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok();
        if valid {
            Ok(Value::DateTime(text.to_string()))
        } else {
            Err(Error::adapter("date-time", format!("'{}' is not a date-time", text)))
        }
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::DateTime(dt) => Ok(dt.clone()),
            other => Err(mismatch("date-time", other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct Base64Adapter;

impl DataTypeAdapter for Base64Adapter {
    fn name(&self) -> &str {
        "base64"
    }

    fn parse(&self, text: &str) -> Result<Value> {
        let compact: String = text.split_whitespace().collect();
        STANDARD
            .decode(compact)
            .map(Value::Binary)
            .map_err(|e| Error::adapter("base64", e.to_string()))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Binary(bytes) => Ok(STANDARD.encode(bytes)),
            other => Err(mismatch("base64", other)),
        }
    }
}

/// Rich text, stored as an unqualified XHTML fragment.
///
/// In XML the content is the element's mixed children; in JSON it is the
/// fragment text.
#[derive(Debug)]
pub struct MarkupAdapter {
    multiline: bool,
}

impl MarkupAdapter {
    pub fn line() -> Self {
        Self { multiline: false }
    }

    pub fn multiline() -> Self {
        Self { multiline: true }
    }
}

impl DataTypeAdapter for MarkupAdapter {
    fn name(&self) -> &str {
        if self.multiline {
            "markup-multiline"
        } else {
            "markup-line"
        }
    }

    fn parse(&self, text: &str) -> Result<Value> {
        parse_fragment(text, None)?;
        Ok(Value::Markup(text.to_string()))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Markup(m) | Value::String(m) => Ok(m.clone()),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn is_atomic(&self) -> bool {
        false
    }

    fn default_json_value_key(&self) -> &'static str {
        MARKUP_JSON_VALUE_KEY
    }

    fn is_xml_unwrapped_allowed(&self) -> bool {
        self.multiline
    }

    fn is_xml_mixed(&self) -> bool {
        true
    }

    fn read_xml(&self, element: &XmlElement) -> Result<Value> {
        let content = fragment_to_string(element.children(), element.namespace());
        Ok(Value::Markup(content.trim().to_string()))
    }

    fn write_xml(&self, value: &Value, element: &mut XmlElement) -> Result<()> {
        let content = self.format(value)?;
        let nodes = parse_fragment(&content, element.namespace())?;
        element.extend_nodes(nodes);
        Ok(())
    }
}

/// Adapters by datatype name
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn DataTypeAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AdapterRegistry {
    /// A registry with no adapters
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// A registry with every built-in datatype
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry
            .register(StringAdapter::string())
            .register(StringAdapter::token())
            .register(StringAdapter::uri())
            .register(StringAdapter::uri_reference())
            .register(StringAdapter::uuid())
            .register(StringAdapter::email_address())
            .register(IntegerAdapter::integer())
            .register(IntegerAdapter::non_negative())
            .register(IntegerAdapter::positive())
            .register(DecimalAdapter)
            .register(BooleanAdapter)
            .register(DateAdapter)
            .register(DateTimeAdapter)
            .register(Base64Adapter)
            .register(MarkupAdapter::line())
            .register(MarkupAdapter::multiline());
        registry
    }

    /// Add or replace the adapter for its datatype name
    pub fn register(&mut self, adapter: impl DataTypeAdapter + 'static) -> &mut Self {
        self.adapters
            .insert(adapter.name().to_string(), Arc::new(adapter));
        self
    }

    pub fn get(&self, data_type: &str) -> Option<Arc<dyn DataTypeAdapter>> {
        self.adapters.get(data_type).cloned()
    }

    /// Look up an adapter, failing when the datatype is unknown
    pub fn require(&self, data_type: &str) -> Result<Arc<dyn DataTypeAdapter>> {
        self.get(data_type)
            .ok_or_else(|| Error::adapter(data_type, "no adapter is registered for this datatype"))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_xml::{QName, parse};

    fn registry() -> AdapterRegistry {
        AdapterRegistry::with_builtins()
    }

    #[test]
    fn test_builtin_names() {
        let registry = registry();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names.len(), 16);
        for expected in ["string", "token", "integer", "date-time", "markup-multiline", "base64"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        assert!(registry.require("nope").is_err());
    }

    #[test]
    fn test_string_lexical_rules() {
        let reg = registry();
        assert!(reg.require("string").unwrap().parse("pc 1").is_ok());
        assert!(reg.require("string").unwrap().parse(" padded").is_err());
        assert!(reg.require("token").unwrap().parse("eth0").is_ok());
        assert!(reg.require("token").unwrap().parse("has space").is_err());
        assert!(reg.require("uri").unwrap().parse("https://example.com/x").is_ok());
        assert!(reg.require("uri").unwrap().parse("not a uri").is_err());
        assert!(reg
            .require("uuid")
            .unwrap()
            .parse("67e55044-10b1-426f-9247-bb680e5fe0c8")
            .is_ok());
        assert!(reg.require("email-address").unwrap().parse("a@b.org").is_ok());
    }

    #[test]
    fn test_integer_bounds() {
        let reg = registry();
        assert_eq!(reg.require("integer").unwrap().parse("-4").unwrap(), Value::Integer(-4));
        assert!(reg.require("non-negative-integer").unwrap().parse("-1").is_err());
        assert!(reg.require("positive-integer").unwrap().parse("0").is_err());
        let json = reg
            .require("integer")
            .unwrap()
            .write_json(&Value::Integer(8))
            .unwrap();
        assert_eq!(json, serde_json::json!(8));
        assert!(reg
            .require("integer")
            .unwrap()
            .read_json(&serde_json::json!(1.5))
            .is_err());
    }

    #[test]
    fn test_boolean_and_decimal_json() {
        let reg = registry();
        let boolean = reg.require("boolean").unwrap();
        assert_eq!(boolean.read_json(&serde_json::json!(true)).unwrap(), Value::Boolean(true));
        assert_eq!(boolean.parse("0").unwrap(), Value::Boolean(false));
        let decimal = reg.require("decimal").unwrap();
        assert_eq!(decimal.read_json(&serde_json::json!(2.5)).unwrap(), Value::Decimal(2.5));
        assert!(decimal.parse("NaN").is_err());
    }

    #[test]
    fn test_dates() {
        let reg = registry();
        let date = reg.require("date").unwrap();
        assert!(date.parse("2024-02-29").is_ok());
        assert!(date.parse("2024-02-29Z").is_ok());
        assert!(date.parse("2024-02-29+05:00").is_ok());
        assert!(date.parse("2023-02-29").is_err());
        let date_time = reg.require("date-time").unwrap();
        assert!(date_time.parse("2024-01-01T12:00:00Z").is_ok());
        assert!(date_time.parse("2024-01-01T12:00:00").is_ok());
        assert!(date_time.parse("yesterday").is_err());
    }

    #[test]
    fn test_base64() {
        let adapter = registry().require("base64").unwrap();
        let value = adapter.parse("aGVs\nbG8=").unwrap();
        assert_eq!(value, Value::Binary(b"hello".to_vec()));
        assert_eq!(adapter.format(&value).unwrap(), "aGVsbG8=");
    }

    #[test]
    fn test_markup_xml_content() {
        let adapter = registry().require("markup-line").unwrap();
        let element = parse(r#"<remarks xmlns="urn:x">A <em>fast</em> one</remarks>"#).unwrap();
        let value = adapter.read_xml(&element).unwrap();
        assert_eq!(value, Value::Markup("A <em>fast</em> one".to_string()));

        let mut out = XmlElement::new(QName::new(Some("urn:x"), "remarks"));
        adapter.write_xml(&value, &mut out).unwrap();
        assert_eq!(out, element);
        assert_eq!(adapter.default_json_value_key(), MARKUP_JSON_VALUE_KEY);
        assert!(!adapter.is_atomic());
    }

    #[test]
    fn test_format_type_mismatch() {
        let adapter = registry().require("integer").unwrap();
        let err = adapter.format(&Value::from("x")).unwrap_err();
        assert!(matches!(err, Error::Adapter { .. }));
    }
}
