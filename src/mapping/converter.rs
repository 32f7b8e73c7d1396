//! Ordered registry of raw-value transformers.
//!
//! Before a column value is assigned to a field, the registry hands it to the
//! first converter that accepts the (value, declared field type) pair. When
//! none accepts, the value passes through unchanged.

use crate::error::{DaoError, DaoResult};
use crate::models::value::parse_timestamp;
use crate::models::{SqlValue, ValueKind};
use std::sync::Arc;

/// Transforms a raw column value into the shape a field expects.
pub trait TypeConverter: Send + Sync {
    /// Registry name, used when converters are configured by name.
    fn name(&self) -> &str;

    fn accepts(&self, value: &SqlValue, target: ValueKind) -> bool;

    fn convert(&self, value: SqlValue) -> SqlValue;
}

/// DECIMAL/NUMERIC text into a float, for fields declared as floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalToFloat;

impl TypeConverter for DecimalToFloat {
    fn name(&self) -> &str {
        "decimal-to-float"
    }

    fn accepts(&self, value: &SqlValue, target: ValueKind) -> bool {
        matches!(value, SqlValue::Decimal(_)) && target == ValueKind::Float
    }

    fn convert(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::Decimal(ref s) => s
                .trim()
                .parse()
                .map(SqlValue::Float)
                .unwrap_or(value),
            other => other,
        }
    }
}

/// Binary large objects into text.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesToText;

impl TypeConverter for BytesToText {
    fn name(&self) -> &str {
        "bytes-to-text"
    }

    fn accepts(&self, value: &SqlValue, target: ValueKind) -> bool {
        matches!(value, SqlValue::Bytes(_)) && target == ValueKind::Text
    }

    fn convert(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::Bytes(bytes) => SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
            other => other,
        }
    }
}

/// 0/1 integers into booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerToBool;

impl TypeConverter for IntegerToBool {
    fn name(&self) -> &str {
        "integer-to-bool"
    }

    fn accepts(&self, value: &SqlValue, target: ValueKind) -> bool {
        matches!(value, SqlValue::Int(_)) && target == ValueKind::Bool
    }

    fn convert(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::Int(v) => SqlValue::Bool(v != 0),
            other => other,
        }
    }
}

/// JSON stored as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextToJson;

impl TypeConverter for TextToJson {
    fn name(&self) -> &str {
        "text-to-json"
    }

    fn accepts(&self, value: &SqlValue, target: ValueKind) -> bool {
        matches!(value, SqlValue::Text(_)) && target == ValueKind::Json
    }

    fn convert(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::Text(ref s) => serde_json::from_str(s).map(SqlValue::Json).unwrap_or(value),
            other => other,
        }
    }
}

/// Timestamps stored as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextToTimestamp;

impl TypeConverter for TextToTimestamp {
    fn name(&self) -> &str {
        "text-to-timestamp"
    }

    fn accepts(&self, value: &SqlValue, target: ValueKind) -> bool {
        matches!(value, SqlValue::Text(_)) && target == ValueKind::Timestamp
    }

    fn convert(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::Text(ref s) => parse_timestamp(s).map(SqlValue::Timestamp).unwrap_or(value),
            other => other,
        }
    }
}

/// Look up a built-in converter by name.
pub fn builtin(name: &str) -> Option<Arc<dyn TypeConverter>> {
    let converter: Arc<dyn TypeConverter> = match name.trim() {
        "decimal-to-float" => Arc::new(DecimalToFloat),
        "bytes-to-text" => Arc::new(BytesToText),
        "integer-to-bool" => Arc::new(IntegerToBool),
        "text-to-json" => Arc::new(TextToJson),
        "text-to-timestamp" => Arc::new(TextToTimestamp),
        _ => return None,
    };
    Some(converter)
}

/// Converters consulted in registration order.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn TypeConverter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in converter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DecimalToFloat));
        registry.register(Arc::new(BytesToText));
        registry.register(Arc::new(IntegerToBool));
        registry.register(Arc::new(TextToJson));
        registry.register(Arc::new(TextToTimestamp));
        registry
    }

    /// Build from configured names. Unknown names are rejected.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> DaoResult<Self> {
        let mut registry = Self::new();
        for name in names.iter().map(AsRef::as_ref).filter(|n| !n.trim().is_empty()) {
            let converter = builtin(name).ok_or_else(|| {
                DaoError::invalid_input(format!("Unknown type converter '{}'", name.trim()))
            })?;
            registry.register(converter);
        }
        Ok(registry)
    }

    pub fn register(&mut self, converter: Arc<dyn TypeConverter>) {
        self.converters.push(converter);
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.converters.iter().map(|c| c.name().to_string()).collect()
    }

    /// Apply the first accepting converter, or return the value unchanged.
    pub fn apply(&self, value: SqlValue, target: ValueKind) -> SqlValue {
        if value.is_null() {
            return value;
        }
        match self.converters.iter().find(|c| c.accepts(&value, target)) {
            Some(converter) => converter.convert(value),
            None => value,
        }
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shout;

    impl TypeConverter for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        fn accepts(&self, value: &SqlValue, target: ValueKind) -> bool {
            matches!(value, SqlValue::Text(_)) && target == ValueKind::Text
        }

        fn convert(&self, value: SqlValue) -> SqlValue {
            match value {
                SqlValue::Text(s) => SqlValue::Text(s.to_uppercase()),
                other => other,
            }
        }
    }

    #[test]
    fn test_first_accepting_converter_wins() {
        let mut registry = ConverterRegistry::new();
        registry.register(Arc::new(Shout));
        registry.register(Arc::new(BytesToText));
        assert_eq!(
            registry.apply(SqlValue::Text("hi".into()), ValueKind::Text),
            SqlValue::Text("HI".into())
        );
        assert_eq!(
            registry.apply(SqlValue::Bytes(b"ok".to_vec()), ValueKind::Text),
            SqlValue::Text("ok".into())
        );
    }

    #[test]
    fn test_pass_through_when_nothing_accepts() {
        let registry = ConverterRegistry::with_builtins();
        assert_eq!(
            registry.apply(SqlValue::Int(3), ValueKind::Int),
            SqlValue::Int(3)
        );
        assert_eq!(registry.apply(SqlValue::Null, ValueKind::Bool), SqlValue::Null);
    }

    #[test]
    fn test_decimal_to_float() {
        let registry = ConverterRegistry::from_names(&["decimal-to-float"]).unwrap();
        assert_eq!(
            registry.apply(SqlValue::Decimal("12.50".into()), ValueKind::Float),
            SqlValue::Float(12.5)
        );
        // Not a float target
        assert_eq!(
            registry.apply(SqlValue::Decimal("12.50".into()), ValueKind::Text),
            SqlValue::Decimal("12.50".into())
        );
    }

    #[test]
    fn test_text_to_timestamp_keeps_unparseable_text() {
        let registry = ConverterRegistry::from_names(&["text-to-timestamp"]).unwrap();
        assert!(matches!(
            registry.apply(SqlValue::Text("2024-01-02 03:04:05".into()), ValueKind::Timestamp),
            SqlValue::Timestamp(_)
        ));
        assert_eq!(
            registry.apply(SqlValue::Text("soon".into()), ValueKind::Timestamp),
            SqlValue::Text("soon".into())
        );
    }

    #[test]
    fn test_from_names_rejects_unknown() {
        let err = ConverterRegistry::from_names(&["blob2bytes"]).unwrap_err();
        assert!(err.to_string().contains("blob2bytes"));
        assert!(ConverterRegistry::from_names::<&str>(&[]).unwrap().is_empty());
    }
}
