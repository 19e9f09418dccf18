//! JSON conversion for log field values.
//!
//! Conversion never fails: values the native encoder rejects are replaced by
//! their textual form so one odd field cannot abort a whole bulk write.

use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::trace;

use crate::entry::FieldValue;

/// Convert any serializable value into a JSON value.
///
/// `serde_json` encoding is tried first; if it errors (non-string map keys,
/// a `Serialize` impl that bails out, ...) the value's `Debug` form is used.
pub fn to_serializable<T>(value: &T) -> Value
where
    T: Serialize + std::fmt::Debug + ?Sized,
{
    match serde_json::to_value(value) {
        Ok(json) => json,
        Err(e) => {
            trace!(error = %e, "Native encoding failed, using textual fallback");
            Value::String(format!("{:?}", value))
        }
    }
}

fn float_to_json(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

impl FieldValue {
    /// JSON form of this value as written to the backend.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::UInt(u) => Value::from(*u),
            FieldValue::Float(f) => float_to_json(*f),
            FieldValue::Text(s) | FieldValue::Error(s) | FieldValue::Opaque(s) => {
                Value::String(s.clone())
            }
            FieldValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            FieldValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            FieldValue::Decimal { mantissa, scale } => {
                let text = format!("{}e-{}", mantissa, scale);
                match text.parse::<f64>() {
                    Ok(f) => float_to_json(f),
                    Err(_) => Value::String(text),
                }
            }
            FieldValue::Json(json) => json.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::collections::HashMap;

    #[derive(Debug)]
    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot encode"))
        }
    }

    #[test]
    fn test_native_values_pass_through() {
        assert_eq!(to_serializable(&42), Value::from(42));
        assert_eq!(to_serializable("hello"), Value::from("hello"));
        assert_eq!(to_serializable(&vec![1, 2, 3]), serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_unencodable_falls_back_to_text() {
        let value = to_serializable(&Unencodable);
        assert_eq!(value, Value::String("Unencodable".to_string()));

        // Tuple keys are rejected by serde_json
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        let value = to_serializable(&map);
        let text = value.as_str().expect("fallback should be a string");
        assert!(!text.is_empty());
        assert!(text.contains("pair"));
    }

    #[test]
    fn test_timestamp_serializes_to_iso8601() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(
            FieldValue::Timestamp(ts).to_json(),
            Value::from("2024-03-14T09:26:53+00:00")
        );

        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(FieldValue::Date(date).to_json(), Value::from("2024-03-14"));
    }

    #[test]
    fn test_decimal_serializes_to_float() {
        let value = FieldValue::Decimal {
            mantissa: 1250,
            scale: 2,
        }
        .to_json();
        assert_eq!(value.as_f64(), Some(12.5));
    }

    #[test]
    fn test_decimal_rounds_once() {
        let value = FieldValue::Decimal {
            mantissa: 9_007_199_254_740_995,
            scale: 3,
        }
        .to_json();
        assert_eq!(value.as_f64(), Some(9_007_199_254_740.994));

        let tiny = FieldValue::Decimal {
            mantissa: 1,
            scale: u32::MAX,
        }
        .to_json();
        assert_eq!(tiny.as_f64(), Some(0.0));
    }

    #[test]
    fn test_non_finite_float_falls_back_to_text() {
        assert_eq!(FieldValue::Float(f64::NAN).to_json(), Value::from("NaN"));
        assert_eq!(FieldValue::Float(1.5).to_json(), Value::from(1.5));
    }

    #[test]
    fn test_error_value_keeps_source_chain() {
        #[derive(Debug)]
        struct WriteFailed(std::io::Error);

        impl std::fmt::Display for WriteFailed {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "outer")
            }
        }

        impl std::error::Error for WriteFailed {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let value = FieldValue::error(&io).to_json();
        assert_eq!(value, Value::from("disk full"));

        let err = WriteFailed(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let value = FieldValue::error(&err).to_json();
        assert_eq!(value, Value::from("outer: disk full"));
    }
}
