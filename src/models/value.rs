//! Value kinds and typed values.
//!
//! [`ValueKind`] is the closed set of primitive kinds used to bind, parse and
//! validate scalar values. [`Value`] is a runtime value of one of those kinds,
//! or NULL.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Primitive kind of a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
}

impl ValueKind {
    /// All kinds, in declaration order.
    pub const ALL: [ValueKind; 6] = [
        ValueKind::Text,
        ValueKind::Integer,
        ValueKind::Decimal,
        ValueKind::Boolean,
        ValueKind::Date,
        ValueKind::Timestamp,
    ];

    /// Parse text into a value of this kind.
    ///
    /// Returns `None` when the text is not a valid value of this kind. Empty
    /// text is only valid for [`ValueKind::Text`].
    pub fn parse(&self, text: &str) -> Option<Value> {
        let trimmed = text.trim();
        if trimmed.is_empty() && *self != ValueKind::Text {
            return None;
        }
        match self {
            ValueKind::Text => Some(Value::Text(text.to_string())),
            ValueKind::Integer => parse_integer(trimmed).map(Value::Integer),
            ValueKind::Decimal => parse_decimal(trimmed).map(Value::Decimal),
            ValueKind::Boolean => parse_boolean(trimmed).map(Value::Boolean),
            ValueKind::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .map(Value::Date),
            ValueKind::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
        }
    }

    /// Check whether an already-typed value may be bound as this kind.
    ///
    /// NULL is compatible with every kind. No widening is performed: an
    /// integer is not a decimal.
    pub fn is_compatible(&self, value: &Value) -> bool {
        match value.kind() {
            None => true,
            Some(kind) => kind == *self,
        }
    }

    /// Lowercase name used in messages and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Text => "text",
            ValueKind::Integer => "integer",
            ValueKind::Decimal => "decimal",
            ValueKind::Boolean => "boolean",
            ValueKind::Date => "date",
            ValueKind::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(ValueKind::Text),
            "integer" | "int" => Ok(ValueKind::Integer),
            "decimal" | "numeric" => Ok(ValueKind::Decimal),
            "boolean" | "bool" => Ok(ValueKind::Boolean),
            "date" => Ok(ValueKind::Date),
            "timestamp" | "datetime" => Ok(ValueKind::Timestamp),
            other => Err(format!("Unknown value kind: {}", other)),
        }
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Integers go through decimal parsing so that "12.0" is accepted while
/// "12.34" is rejected for its non-zero fractional part.
fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    let decimal = parse_decimal(text)?;
    if !decimal.fract().is_zero() {
        return None;
    }
    decimal.trunc().to_i64()
}

fn parse_boolean(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// A typed scalar value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Kind of this value, `None` for NULL.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(ValueKind::Text),
            Value::Integer(_) => Some(ValueKind::Integer),
            Value::Decimal(_) => Some(ValueKind::Decimal),
            Value::Boolean(_) => Some(ValueKind::Boolean),
            Value::Date(_) => Some(ValueKind::Date),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
        }
    }

    /// Check if this value is NULL (unset).
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value for messages.
    pub fn type_name(&self) -> &'static str {
        self.kind().map(|k| k.name()).unwrap_or("null")
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Plain JSON rendering: decimals as strings, dates in ISO format.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as JsonValue;
        match self {
            Value::Null => JsonValue::Null,
            Value::Text(v) => JsonValue::String(v.clone()),
            Value::Integer(v) => JsonValue::Number((*v).into()),
            Value::Decimal(v) => JsonValue::String(v.to_string()),
            Value::Boolean(v) => JsonValue::Bool(*v),
            Value::Date(v) => JsonValue::String(v.format(DATE_FORMAT).to_string()),
            Value::Timestamp(v) => JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(v) => f.write_str(v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
