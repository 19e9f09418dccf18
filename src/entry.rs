//! Log records accepted by the shipper and the entries it buffers.
//!
//! A [`LogRecord`] is what a producer hands in. The shipper turns it into a
//! [`LogEntry`]: a flat, ordered JSON document made of the configured
//! additional fields, the record's own fields and a formatted timestamp.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::serializer::to_serializable;

/// A single field value carried by a [`LogRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),

    /// Fixed-point number: `mantissa * 10^-scale`
    Decimal { mantissa: i128, scale: u32 },

    /// Pre-encoded JSON
    Json(Value),

    /// Error message including its `source()` chain
    Error(String),

    /// Textual form of a value with no native encoding
    Opaque(String),
}

impl FieldValue {
    /// Capture an error and every error in its source chain.
    pub fn error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut text = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        FieldValue::Error(text)
    }

    /// Capture any value through its `Display` form.
    pub fn display(value: &impl std::fmt::Display) -> Self {
        FieldValue::Opaque(value.to_string())
    }

    /// Encode any serializable value, falling back to its `Debug` form.
    pub fn serialized<T>(value: &T) -> Self
    where
        T: Serialize + std::fmt::Debug + ?Sized,
    {
        FieldValue::Json(to_serializable(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

macro_rules! field_from_int {
    ($variant:ident, $target:ty, $($t:ty),*) => {
        $(
            impl From<$t> for FieldValue {
                fn from(value: $t) -> Self {
                    FieldValue::$variant(value as $target)
                }
            }
        )*
    };
}

field_from_int!(Int, i64, i8, i16, i32, i64, isize);
field_from_int!(UInt, u64, u8, u16, u32, u64, usize);

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(f64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// A log event as produced by the application.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Creation time in milliseconds since the Unix epoch
    pub created_millis: i64,

    /// Per-event fields, in the order they were added
    pub fields: Vec<(String, FieldValue)>,
}

impl LogRecord {
    /// Create an empty record created at `created_millis`.
    pub fn new(created_millis: i64) -> Self {
        Self {
            created_millis,
            fields: Vec::new(),
        }
    }

    /// Create an empty record stamped with the current time.
    pub fn now() -> Self {
        Self::new(Utc::now().timestamp_millis())
    }

    /// Add a field to the record.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add several fields to the record.
    pub fn with_fields<K, V, I>(mut self, fields: I) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// A buffered document, ready to be bulk-written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogEntry {
    fields: Map<String, Value>,
}

impl LogEntry {
    /// Build an entry from the engine's additional fields and a record.
    ///
    /// Filtered field names are skipped, null values become empty strings and
    /// the timestamp field always reflects the record's creation time.
    pub(crate) fn build(
        additional_fields: &Map<String, Value>,
        record: LogRecord,
        filtered_fields: &HashSet<String>,
        timestamp_field: &str,
    ) -> Self {
        let mut fields = additional_fields.clone();

        for (name, value) in record.fields {
            if filtered_fields.contains(&name) {
                continue;
            }
            let json = if value.is_null() {
                Value::String(String::new())
            } else {
                value.to_json()
            };
            fields.insert(name, json);
        }

        fields.insert(
            timestamp_field.to_string(),
            Value::String(format_timestamp(record.created_millis)),
        );

        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Format epoch milliseconds as a UTC timestamp with millisecond precision,
/// e.g. `2024-03-14T09:26:53.589Z`.
pub fn format_timestamp(created_millis: i64) -> String {
    DateTime::from_timestamp_millis(created_millis)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
