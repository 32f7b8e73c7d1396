//! Column values exchanged between entities, statements and cached rows.

use crate::error::{DaoError, DaoResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Current row as an upper-cased column name to value mapping.
pub type RowMap = HashMap<String, SqlValue>;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// A single column value, used both as a bound parameter and as a decoded
/// result cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    #[default]
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    Text(String),
    /// Exact DECIMAL/NUMERIC text as returned by the driver
    Decimal(String),
    Timestamp(NaiveDateTime),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    Json(JsonValue),
}

/// Declared type of an entity field, consulted by type converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Decimal,
    Text,
    Bytes,
    Json,
    Timestamp,
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Decimal(_) => "decimal",
            Self::Timestamp(_) => "timestamp",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    /// The kind a value already has; `Null` reports `Any`.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Any,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Json(_) => ValueKind::Json,
        }
    }

    /// Render the value as text, the way a cached row's string accessor sees it.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Text(v) | Self::Decimal(v) => Some(v.clone()),
            Self::Timestamp(v) => Some(v.to_string()),
            Self::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
            Self::Json(v) => Some(v.to_string()),
        }
    }

    /// Convert to a JSON value for output.
    pub fn to_json(&self) -> JsonValue {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Self::Text(v) | Self::Decimal(v) => JsonValue::String(v.clone()),
            Self::Timestamp(v) => JsonValue::String(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Self::Bytes(v) => JsonValue::String(STANDARD.encode(v)),
            Self::Json(v) => v.clone(),
        }
    }

    /// Decode into a field's Rust type, naming the field on failure.
    pub fn decode<T: FromSqlValue>(self, field: &str) -> DaoResult<T> {
        T::from_sql_value(self).map_err(|message| DaoError::conversion(field, message))
    }
}

impl From<JsonValue> for SqlValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }
}

macro_rules! impl_from_for_sql_value {
    ($($ty:ty => $variant:ident $(as $cast:ty)?),+ $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v $(as $cast)?)
                }
            }
        )+
    };
}

impl_from_for_sql_value! {
    bool => Bool,
    i32 => Int as i64,
    i64 => Int,
    u32 => Int as i64,
    f32 => Float as f64,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDateTime => Timestamp,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

// =============================================================================
// Decoding into field types
// =============================================================================

/// Lenient conversion from a column value into a Rust field type.
///
/// Numeric widening, integer to bool and numeric text are accepted. NULL is
/// only accepted by `Option<T>`.
pub trait FromSqlValue: Sized {
    fn from_sql_value(value: SqlValue) -> Result<Self, String>;
}

fn mismatch(value: &SqlValue, target: &str) -> String {
    format!("cannot convert {} value into {}", value.type_name(), target)
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        Ok(value)
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Int(v) => Ok(v),
            SqlValue::Bool(v) => Ok(v as i64),
            SqlValue::Float(v) => whole_i64(v).ok_or_else(|| mismatch(&value, "i64")),
            SqlValue::Text(ref s) | SqlValue::Decimal(ref s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_i64))
                    .ok_or_else(|| mismatch(&value, "i64"))
            }
            other => Err(mismatch(&other, "i64")),
        }
    }
}

/// Whole floats inside the i64 range. `as` would saturate anything else.
fn whole_i64(v: f64) -> Option<i64> {
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    (v.fract() == 0.0 && (-BOUND..BOUND).contains(&v)).then_some(v as i64)
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        let wide = i64::from_sql_value(value)?;
        i32::try_from(wide).map_err(|_| format!("{} is out of range for i32", wide))
    }
}

impl FromSqlValue for u32 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        let wide = i64::from_sql_value(value)?;
        u32::try_from(wide).map_err(|_| format!("{} is out of range for u32", wide))
    }
}

impl FromSqlValue for u64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        let wide = i64::from_sql_value(value)?;
        u64::try_from(wide).map_err(|_| format!("{} is out of range for u64", wide))
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Float(v) => Ok(v),
            SqlValue::Int(v) => Ok(v as f64),
            SqlValue::Text(ref s) | SqlValue::Decimal(ref s) => {
                s.trim().parse().map_err(|_| mismatch(&value, "f64"))
            }
            other => Err(mismatch(&other, "f64")),
        }
    }
}

impl FromSqlValue for f32 {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        f64::from_sql_value(value).map(|v| v as f32)
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Bool(v) => Ok(v),
            SqlValue::Int(v) => Ok(v != 0),
            SqlValue::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "t" | "y" | "yes" => Ok(true),
                "false" | "0" | "f" | "n" | "no" => Ok(false),
                _ => Err(mismatch(&value, "bool")),
            },
            other => Err(mismatch(&other, "bool")),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Null => Err("unexpected NULL for String".to_string()),
            SqlValue::Bytes(bytes) => {
                String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))
            }
            other => other.as_text().ok_or_else(|| mismatch(&other, "String")),
        }
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Bytes(v) => Ok(v),
            SqlValue::Text(v) => Ok(v.into_bytes()),
            other => Err(mismatch(&other, "bytes")),
        }
    }
}

impl FromSqlValue for JsonValue {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Json(v) => Ok(v),
            SqlValue::Text(ref s) => {
                serde_json::from_str(s).map_err(|e| format!("invalid JSON text: {}", e))
            }
            SqlValue::Null => Err("unexpected NULL for JSON".to_string()),
            other => Ok(other.to_json()),
        }
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Timestamp(v) => Ok(v),
            SqlValue::Text(ref s) => parse_timestamp(s).ok_or_else(|| mismatch(&value, "timestamp")),
            other => Err(mismatch(&other, "timestamp")),
        }
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
