//! Conversion between stored property values and field values.
//!
//! The simple property accessor only converts on read, when the stored
//! runtime type differs from the declared one. The converting accessor
//! converts in both directions for types the store cannot hold natively.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::mapping::{FieldType, ScalarKind};
use crate::model::Value;
use crate::{Error, Result};

/// Converts values between their stored and their in-memory form.
pub trait ConversionService: Send + Sync {
    /// Whether the converting accessor should handle fields of this type.
    fn can_convert(&self, field_type: &FieldType) -> bool;

    /// Stored value → field value.
    fn to_field(&self, stored: &Value, field_type: &FieldType) -> Result<Value>;

    /// Field value → stored value.
    fn to_store(&self, value: &Value, field_type: &FieldType) -> Result<Value>;
}

/// Conversions for scalars, arrays, dates, timestamps and enums.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConversionService;

impl DefaultConversionService {
    pub fn new() -> Self {
        Self
    }

    fn scalar(&self, stored: &Value, kind: ScalarKind) -> Result<Value> {
        if kind.matches(stored) {
            return Ok(stored.clone());
        }
        let converted = match (kind, stored) {
            (ScalarKind::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (ScalarKind::Int, Value::Float(f)) if f.fract() == 0.0 => Some(Value::Int(*f as i64)),
            (ScalarKind::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::Int),
            (ScalarKind::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::Float),
            (ScalarKind::Bool, Value::String(s)) => s.trim().parse::<bool>().ok().map(Value::Bool),
            (ScalarKind::String, Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
                Some(Value::String(stored.to_string()))
            }
            _ => None,
        };
        converted.ok_or_else(|| mismatch(&format!("{kind:?}"), stored))
    }
}

impl ConversionService for DefaultConversionService {
    fn can_convert(&self, field_type: &FieldType) -> bool {
        matches!(field_type, FieldType::Date | FieldType::DateTime | FieldType::Enum(_))
    }

    fn to_field(&self, stored: &Value, field_type: &FieldType) -> Result<Value> {
        if stored.is_null() {
            return Ok(field_type.default_value());
        }
        match field_type {
            FieldType::Primitive(kind) | FieldType::Boxed(kind) => self.scalar(stored, *kind),
            FieldType::Array(kind) => match stored {
                Value::List(items) => items
                    .iter()
                    .map(|item| self.scalar(item, *kind))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List),
                other => Err(mismatch(&field_type.describe(), other)),
            },
            FieldType::Date => match stored {
                Value::Date(_) => Ok(stored.clone()),
                Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|_| mismatch("Date", stored)),
                other => Err(mismatch("Date", other)),
            },
            FieldType::DateTime => match stored {
                Value::DateTime(_) => Ok(stored.clone()),
                Value::Int(millis) => Utc
                    .timestamp_millis_opt(*millis)
                    .single()
                    .map(Value::DateTime)
                    .ok_or_else(|| mismatch("DateTime", stored)),
                Value::String(s) => DateTime::parse_from_rfc3339(s)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|_| mismatch("DateTime", stored)),
                other => Err(mismatch("DateTime", other)),
            },
            FieldType::Enum(variants) => match stored {
                Value::String(s) if variants.iter().any(|v| v == s) => Ok(stored.clone()),
                other => Err(mismatch(&format!("one of {variants:?}"), other)),
            },
            other => Err(Error::IllegalUsage(format!(
                "no conversion to field type {}",
                other.describe()
            ))),
        }
    }

    fn to_store(&self, value: &Value, field_type: &FieldType) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (field_type, value) {
            (FieldType::Date, Value::Date(d)) => Ok(Value::String(d.format("%Y-%m-%d").to_string())),
            (FieldType::DateTime, Value::DateTime(dt)) => Ok(Value::Int(dt.timestamp_millis())),
            (FieldType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(value.clone())
                } else {
                    Err(Error::IllegalUsage(format!(
                        "'{s}' is not one of {variants:?}"
                    )))
                }
            }
            (FieldType::Primitive(_) | FieldType::Boxed(_) | FieldType::Array(_), _) => {
                Ok(value.clone())
            }
            (expected, other) => Err(mismatch(&expected.describe(), other)),
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> Error {
    Error::TypeMismatch { expected: expected.to_string(), got: got.type_name().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_side_widening() {
        let conv = DefaultConversionService::new();
        let float = FieldType::Boxed(ScalarKind::Float);
        assert_eq!(conv.to_field(&Value::Int(2), &float).unwrap(), Value::Float(2.0));

        let int = FieldType::Primitive(ScalarKind::Int);
        assert_eq!(conv.to_field(&Value::from("42"), &int).unwrap(), Value::Int(42));
        assert!(conv.to_field(&Value::from("x"), &int).is_err());
    }

    #[test]
    fn test_array_elements_converted() {
        let conv = DefaultConversionService::new();
        let ty = FieldType::Array(ScalarKind::Float);
        let stored = Value::from(vec![1, 2]);
        assert_eq!(
            conv.to_field(&stored, &ty).unwrap(),
            Value::List(vec![Value::Float(1.0), Value::Float(2.0)])
        );
    }

    #[test]
    fn test_date_both_directions() {
        let conv = DefaultConversionService::new();
        let date = NaiveDate::from_ymd_opt(2011, 2, 28).unwrap();
        let stored = conv.to_store(&Value::Date(date), &FieldType::Date).unwrap();
        assert_eq!(stored, Value::from("2011-02-28"));
        assert_eq!(conv.to_field(&stored, &FieldType::Date).unwrap(), Value::Date(date));
    }

    #[test]
    fn test_datetime_as_millis() {
        let conv = DefaultConversionService::new();
        let dt = Utc.timestamp_millis_opt(1_300_000_000_123).single().unwrap();
        let stored = conv.to_store(&Value::DateTime(dt), &FieldType::DateTime).unwrap();
        assert_eq!(stored, Value::Int(1_300_000_000_123));
        assert_eq!(conv.to_field(&stored, &FieldType::DateTime).unwrap(), Value::DateTime(dt));
    }

    #[test]
    fn test_enum_rejects_unknown_variant() {
        let conv = DefaultConversionService::new();
        let ty = FieldType::Enum(vec!["RED".into(), "GREEN".into()]);
        assert!(conv.to_store(&Value::from("RED"), &ty).is_ok());
        assert!(matches!(conv.to_store(&Value::from("BLUE"), &ty), Err(Error::IllegalUsage(_))));
        assert!(conv.can_convert(&ty));
        assert!(!conv.can_convert(&FieldType::Boxed(ScalarKind::Int)));
    }
}
