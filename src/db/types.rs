//! Decoding of driver rows into [`SqlValue`] cells.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! SQLite is the exception: its declared column type is only a hint, so the
//! decoder looks at the storage class of each value and uses the category to
//! refine it (booleans, timestamps, JSON text).

use crate::db::CachedResultSet;
use crate::models::{DatabaseType, SqlValue};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Timestamp,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("timestamp") || lower == "datetime" {
        return TypeCategory::Timestamp;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower.contains("clob") {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw MySQL DECIMAL text. MySQL sends DECIMAL as text in both protocols.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Exact text of a NUMERIC decoded through `rust_decimal`, scale preserved.
///
/// PostgreSQL sends NUMERIC in binary form for prepared statements, so it
/// cannot be read as a string the way MySQL's DECIMAL can.
pub(crate) fn decimal_cell(value: rust_decimal::Decimal) -> SqlValue {
    SqlValue::Decimal(value.to_string())
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Trait for converting driver rows into cached cells.
pub trait RowDecode {
    fn column_names(&self) -> Vec<String>;
    fn decode_values(&self) -> Vec<SqlValue>;
}

/// Materialize driver rows into a detached result set.
pub fn capture_rows<R: RowDecode>(rows: &[R]) -> CachedResultSet {
    let columns = rows.first().map(R::column_names).unwrap_or_default();
    let values = rows.iter().map(R::decode_values).collect();
    CachedResultSet::capture(&columns, values)
}

macro_rules! impl_row_decode {
    ($row:ty, $db:expr, $decoder:path) => {
        impl RowDecode for $row {
            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }

            fn decode_values(&self) -> Vec<SqlValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        $decoder(self, idx, category)
                    })
                    .collect()
            }
        }
    };
}

impl_row_decode!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_decode!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_decode!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

fn json_or_text(text: String) -> SqlValue {
    serde_json::from_str(&text)
        .map(SqlValue::Json)
        .unwrap_or(SqlValue::Text(text))
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> SqlValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            TypeCategory::Time => decode_time(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => SqlValue::Decimal(v.0),
            Ok(None) => SqlValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                SqlValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return SqlValue::Null;
        }
        // Signed widths first, then unsigned
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return SqlValue::Int(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return match i64::try_from(v) {
                Ok(i) => SqlValue::Int(i),
                Err(_) => SqlValue::Decimal(v.to_string()),
            };
        }
        SqlValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> SqlValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return SqlValue::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return SqlValue::Float(v as f64);
        }
        SqlValue::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> SqlValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> SqlValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Json)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_timestamp(row: &MySqlRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            Ok(Some(v)) => SqlValue::Timestamp(v),
            Ok(None) => SqlValue::Null,
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_date(row: &MySqlRow, idx: usize) -> SqlValue {
        row.try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|d| SqlValue::Text(d.to_string()))
            .unwrap_or(SqlValue::Null)
    }

    fn decode_time(row: &MySqlRow, idx: usize) -> SqlValue {
        row.try_get::<Option<chrono::NaiveTime>, _>(idx)
            .ok()
            .flatten()
            .map(|t| SqlValue::Text(t.to_string()))
            .unwrap_or(SqlValue::Null)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return SqlValue::Text(v);
        }
        // VARBINARY-backed text columns
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> SqlValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Timestamp => decode_timestamp(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
            Ok(Some(v)) => decimal_cell(v),
            Ok(None) => SqlValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                SqlValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return SqlValue::Int(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return SqlValue::Int(v);
        }
        SqlValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> SqlValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return SqlValue::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return SqlValue::Float(v as f64);
        }
        SqlValue::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> SqlValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> SqlValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Json)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_timestamp(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return SqlValue::Timestamp(v);
        }
        // timestamptz
        row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Timestamp(v.naive_utc()))
            .unwrap_or(SqlValue::Null)
    }

    fn decode_date(row: &PgRow, idx: usize) -> SqlValue {
        row.try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|d| SqlValue::Text(d.to_string()))
            .unwrap_or(SqlValue::Null)
    }

    fn decode_text(row: &PgRow, idx: usize) -> SqlValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null)
    }
}

mod sqlite {
    use super::*;
    use sqlx::ValueRef;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> SqlValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return SqlValue::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(e) => {
                tracing::error!("Failed to read SQLite column {}: {:?}", idx, e);
                return SqlValue::Null;
            }
        };

        match (storage.as_str(), category) {
            ("INTEGER", TypeCategory::Boolean) => decode_boolean(row, idx),
            ("INTEGER", _) => decode_integer(row, idx),
            ("REAL", _) => decode_float(row, idx),
            ("BLOB", _) => decode_binary(row, idx),
            ("TEXT", TypeCategory::Timestamp) => decode_timestamp(row, idx),
            ("TEXT", TypeCategory::Json) => decode_text(row, idx)
                .as_text()
                .map(json_or_text)
                .unwrap_or(SqlValue::Null),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> SqlValue {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> SqlValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> SqlValue {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> SqlValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null)
    }

    fn decode_timestamp(row: &SqliteRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            Ok(Some(v)) => SqlValue::Timestamp(v),
            Ok(None) => SqlValue::Null,
            Err(_) => decode_text(row, idx),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> SqlValue {
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null)
    }
}
