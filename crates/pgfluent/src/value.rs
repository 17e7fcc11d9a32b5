//! Dynamically typed SQL values.
//!
//! A [`Value`] is produced by the caller and consumed exactly once, either by
//! inline literal rendering ([`Value::render_literal`], used by the insert
//! builder) or by statement binding ([`crate::params::bind_typed`]).

use crate::error::{OrmError, OrmResult};
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, TimeZone, Utc};
use std::fmt;
use thiserror::Error;

/// A value that can be rendered into SQL text or bound to a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A temporal instant with its UTC offset.
    Timestamp(DateTime<FixedOffset>),
    /// Any other object, carried as its display form.
    Object(String),
    /// Arrays are representable but cannot be rendered or bound.
    Array(Vec<Value>),
}

impl Value {
    /// Wrap any displayable object as an opaque value.
    pub fn object(value: impl fmt::Display) -> Self {
        Self::Object(value.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
        }
    }

    /// Render the value as an inline SQL literal.
    ///
    /// `quote` is the driver's string-literal escaper (see
    /// [`crate::Connection::quote`]). Arrays fail with
    /// [`OrmError::UnsupportedType`].
    pub fn render_literal<F>(&self, quote: F) -> OrmResult<String>
    where
        F: Fn(&str) -> String,
    {
        Ok(match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) if f.is_finite() => f.to_string(),
            Self::Float(f) if f.is_nan() => quote("NaN"),
            Self::Float(f) if *f > 0.0 => quote("Infinity"),
            Self::Float(_) => quote("-Infinity"),
            Self::Text(s) | Self::Object(s) => quote(s),
            Self::Timestamp(ts) => quote(&format_timestamp(ts)),
            Self::Array(_) => {
                return Err(OrmError::unsupported_type(
                    "arrays cannot be rendered as an SQL literal",
                ));
            }
        })
    }

    /// Convert into a JSON value (used by the generic-object fetch shape).
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::Text(s) | Self::Object(s) => Json::String(s.clone()),
            Self::Timestamp(ts) => Json::String(format_timestamp(ts)),
            Self::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

/// ISO-8601 extended representation used for both literals and bindings.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Escape a string as a PostgreSQL literal.
///
/// Single quotes are doubled. Strings containing a backslash use the `E'...'`
/// form with the backslashes doubled, so the result is correct regardless of
/// `standard_conforming_strings`.
pub fn quote_literal(s: &str) -> String {
    let has_backslash = s.contains('\\');
    let mut out = String::with_capacity(s.len() + 3);
    if has_backslash {
        out.push('E');
    }
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::Timestamp(v.fixed_offset())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::object(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::object(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// A fetched value could not be converted into the requested Rust type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {found} into {expected}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub found: &'static str,
}

impl ConversionError {
    fn new(expected: &'static str, value: &Value) -> Self {
        Self {
            expected,
            found: value.type_name(),
        }
    }
}

/// Conversion from a fetched [`Value`] into a Rust type.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ConversionError::new("bool", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(ConversionError::new("i64", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(i) => i32::try_from(i).map_err(|_| ConversionError {
                expected: "i32",
                found: "out-of-range integer",
            }),
            other => Err(ConversionError::new("i32", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(ConversionError::new("f64", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Text(s) | Value::Object(s) => Ok(s),
            other => Err(ConversionError::new("String", &other)),
        }
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::Text(ref s) | Value::Object(ref s) => {
                DateTime::parse_from_rfc3339(s).map_err(|_| ConversionError {
                    expected: "DateTime",
                    found: "non-ISO-8601 string",
                })
            }
            other => Err(ConversionError::new("DateTime", &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        DateTime::<FixedOffset>::from_value(value).map(|ts| ts.with_timezone(&Utc))
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Text(ref s) | Value::Object(ref s) => {
                uuid::Uuid::parse_str(s).map_err(|_| ConversionError {
                    expected: "Uuid",
                    found: "malformed uuid string",
                })
            }
            other => Err(ConversionError::new("Uuid", &other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Object(ref s) | Value::Text(ref s) => {
                serde_json::from_str(s).map_err(|_| ConversionError {
                    expected: "JSON",
                    found: "malformed JSON string",
                })
            }
            other => Ok(other.to_json()),
        }
    }
}
