//! Typed values for variable attributes.
//!
//! # Responsibility
//! - Define the closed set of value types an attribute can hold.
//! - Own timestamp normalization and its ISO-8601 text forms.
//! - Convert values to and from their JSON wire shape.
//!
//! # Invariants
//! - Equality and ordering are per variant; cross-variant comparison is
//!   always unequal / unordered.
//! - Stored timestamps carry at most microsecond precision.
//! - Float values are finite.

use crate::model::validation::ValidationError;
use chrono::{DateTime, NaiveDateTime, SubsecRound};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value as JsonValue};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Point in time used for event bounds and timestamp attributes.
///
/// Naive (zone-less) by convention; callers are expected to use UTC.
pub type Timestamp = NaiveDateTime;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Exact shape written by [`format_timestamp`]; only this shape is read back
/// as a timestamp from JSON.
static EXPORTED_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}$")
        .expect("valid timestamp regex")
});

/// Discriminator of [`AttributeValue`] variants.
///
/// The string form is persisted as the attribute `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    StringList,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::StringList => "string_list",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "timestamp" => Some(Self::Timestamp),
            "string_list" => Some(Self::StringList),
            _ => None,
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of one variable attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(Timestamp),
    StringList(Vec<String>),
}

impl AttributeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::StringList(_) => ValueKind::StringList,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns the value in its storable form.
    ///
    /// Timestamps are truncated to microseconds; non-finite floats are
    /// rejected.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        match self {
            Self::Float(value) if !value.is_finite() => Err(ValidationError::NonFiniteFloat),
            Self::Timestamp(value) => Ok(Self::Timestamp(normalize_timestamp(value))),
            other => Ok(other),
        }
    }

    /// Encodes the value for the JSON wire format.
    ///
    /// Timestamps become ISO-8601 strings; this is the only lossy mapping and
    /// is undone by [`AttributeValue::from_json`].
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::String(value) => JsonValue::String(value.clone()),
            Self::Integer(value) => JsonValue::from(*value),
            Self::Float(value) => Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::Boolean(value) => JsonValue::Bool(*value),
            Self::Timestamp(value) => JsonValue::String(format_timestamp(value)),
            Self::StringList(values) => {
                JsonValue::Array(values.iter().cloned().map(JsonValue::String).collect())
            }
        }
    }

    /// Decodes one attribute value from its JSON wire shape.
    ///
    /// Strings in the exact exported form (`%Y-%m-%dT%H:%M:%S%.6f`) are read
    /// back as timestamps; every other string stays a string.
    pub fn from_json(value: &JsonValue) -> Result<Self, ValidationError> {
        match value {
            JsonValue::String(text) => {
                if EXPORTED_TIMESTAMP_RE.is_match(text) {
                    if let Some(timestamp) = parse_timestamp(text) {
                        return Ok(Self::Timestamp(timestamp));
                    }
                }
                Ok(Self::String(text.clone()))
            }
            JsonValue::Bool(flag) => Ok(Self::Boolean(*flag)),
            JsonValue::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    Ok(Self::Integer(integer))
                } else if let Some(float) = number.as_f64() {
                    Self::Float(float).normalized()
                } else {
                    Err(ValidationError::UnsupportedValue(number.to_string()))
                }
            }
            JsonValue::Array(items) => items
                .iter()
                .map(|item| match item {
                    JsonValue::String(text) => Ok(text.clone()),
                    other => Err(ValidationError::UnsupportedValue(other.to_string())),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::StringList),
            other => Err(ValidationError::UnsupportedValue(other.to_string())),
        }
    }
}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(lhs), Self::String(rhs)) => Some(lhs.cmp(rhs)),
            (Self::Integer(lhs), Self::Integer(rhs)) => Some(lhs.cmp(rhs)),
            (Self::Float(lhs), Self::Float(rhs)) => lhs.partial_cmp(rhs),
            (Self::Boolean(lhs), Self::Boolean(rhs)) => Some(lhs.cmp(rhs)),
            (Self::Timestamp(lhs), Self::Timestamp(rhs)) => Some(lhs.cmp(rhs)),
            (Self::StringList(lhs), Self::StringList(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Timestamp(value) => f.write_str(&format_timestamp(value)),
            Self::StringList(values) => write!(f, "{values:?}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Timestamp> for AttributeValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        Self::StringList(value.into_iter().map(str::to_string).collect())
    }
}

/// Truncates a timestamp to the stored microsecond precision.
pub fn normalize_timestamp(value: Timestamp) -> Timestamp {
    value.trunc_subsecs(6)
}

/// Formats a timestamp in the fixed-width storage and wire form.
///
/// Fixed width keeps lexical order equal to chronological order.
pub fn format_timestamp(value: &Timestamp) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses ISO-8601 date-time text.
///
/// Accepts `T` or space separators with optional fraction, and RFC 3339
/// offsets, which are converted to UTC.
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<NaiveDateTime>() {
        return Some(normalize_timestamp(value));
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(normalize_timestamp(value));
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|value| normalize_timestamp(value.naive_utc()))
}
