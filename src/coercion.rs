// 🔁 Rule Value Coercion - Raw input → exactly one typed slot
//
// Raw values arrive as JSON. The Validation's data type decides which slot
// (flag / number / text) gets populated.

use crate::entities::{DataType, RuleValue, Validation};
use crate::error::{CatalogError, CatalogResult};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Accepted truthy tokens (case-insensitive)
pub const TRUTHY: [&str; 7] = ["true", "si", "sí", "s", "yes", "y", "1"];

/// Accepted falsy tokens (case-insensitive)
pub const FALSY: [&str; 4] = ["false", "no", "n", "0"];

// ============================================================================
// COERCION
// ============================================================================

pub fn coerce(data_type: DataType, raw: &Value) -> CatalogResult<RuleValue> {
    if raw.is_null() {
        return Err(CatalogError::invalid("value is required"));
    }

    match data_type {
        DataType::Bool => coerce_flag(raw).map(RuleValue::Flag),
        DataType::Number => coerce_number(raw).map(RuleValue::Number),
        DataType::Text => coerce_text(raw).map(RuleValue::Text),
    }
}

fn coerce_flag(raw: &Value) -> CatalogResult<bool> {
    let token = match raw {
        Value::Bool(b) => return Ok(*b),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_lowercase(),
        _ => return Err(CatalogError::invalid("BOOL value must be a scalar")),
    };

    if TRUTHY.contains(&token.as_str()) {
        Ok(true)
    } else if FALSY.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(CatalogError::invalid(format!(
            "'{}' is not a boolean value",
            token
        )))
    }
}

fn coerce_number(raw: &Value) -> CatalogResult<f64> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(CatalogError::invalid(format!("'{}' is not a number", display(raw)))),
    }
}

fn coerce_text(raw: &Value) -> CatalogResult<String> {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return Err(CatalogError::invalid("TEXT value must be a scalar")),
    };

    if text.is_empty() {
        return Err(CatalogError::invalid("TEXT value must not be blank"));
    }
    Ok(text)
}

fn display(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// USABILITY
// ============================================================================

/// A validation can only be attached while active and inside its window
pub fn ensure_usable(validation: &Validation, now: DateTime<Utc>) -> CatalogResult<()> {
    if !validation.status.is_active() {
        return Err(CatalogError::invalid(format!(
            "validation {} is inactive",
            validation.code
        )));
    }
    if !validation.is_within_window(now) {
        return Err(CatalogError::invalid(format!(
            "validation {} is outside its activity window",
            validation.code
        )));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ValidationMap;
    use crate::error::ErrorKind;
    use crate::status::Status;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_null_is_rejected_for_every_type() {
        for dt in [DataType::Bool, DataType::Number, DataType::Text] {
            let err = coerce(dt, &Value::Null).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidData);
        }
    }

    #[test]
    fn test_bool_round_trip_to_flag() {
        let value = coerce(DataType::Bool, &json!("true")).unwrap();
        let map = ValidationMap::new("SUB".into(), "123456007".into(), 1, value, "t");
        assert_eq!(map.value_flag.as_deref(), Some("SI"));
        assert_eq!(map.value_num, None);
        assert_eq!(map.value_text, None);

        let value = coerce(DataType::Bool, &json!("false")).unwrap();
        let map = ValidationMap::new("SUB".into(), "123456007".into(), 1, value, "t");
        assert_eq!(map.value_flag.as_deref(), Some("NO"));
    }

    #[test]
    fn test_bool_tokens_case_insensitive() {
        for token in ["TRUE", "Si", "Y", "1", " yes "] {
            assert_eq!(coerce(DataType::Bool, &json!(token)).unwrap(), RuleValue::Flag(true));
        }
        for token in ["False", "NO", "n", "0"] {
            assert_eq!(coerce(DataType::Bool, &json!(token)).unwrap(), RuleValue::Flag(false));
        }
        assert_eq!(coerce(DataType::Bool, &json!(true)).unwrap(), RuleValue::Flag(true));
        assert_eq!(coerce(DataType::Bool, &json!(0)).unwrap(), RuleValue::Flag(false));
        assert!(coerce(DataType::Bool, &json!("maybe")).is_err());
        assert!(coerce(DataType::Bool, &json!([true])).is_err());
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(coerce(DataType::Number, &json!("12.5")).unwrap(), RuleValue::Number(12.5));
        assert_eq!(coerce(DataType::Number, &json!(" -3 ")).unwrap(), RuleValue::Number(-3.0));
        assert_eq!(coerce(DataType::Number, &json!(7)).unwrap(), RuleValue::Number(7.0));
        assert!(coerce(DataType::Number, &json!("twelve")).is_err());
        assert!(coerce(DataType::Number, &json!("NaN")).is_err());
        assert!(coerce(DataType::Number, &json!(true)).is_err());
    }

    #[test]
    fn test_text_is_stringified() {
        assert_eq!(
            coerce(DataType::Text, &json!(" hello ")).unwrap(),
            RuleValue::Text("hello".into())
        );
        assert_eq!(coerce(DataType::Text, &json!(42)).unwrap(), RuleValue::Text("42".into()));
        assert!(coerce(DataType::Text, &json!("   ")).is_err());
        assert!(coerce(DataType::Text, &json!({"a": 1})).is_err());
    }

    #[test]
    fn test_ensure_usable() {
        let now = Utc::now();
        let mut v = Validation::new("V1".into(), DataType::Bool, "t");
        assert!(ensure_usable(&v, now).is_ok());

        v.valid_to = Some(now - Duration::days(1));
        assert!(ensure_usable(&v, now).is_err());

        v.valid_to = None;
        v.valid_from = Some(now + Duration::days(1));
        assert!(ensure_usable(&v, now).is_err());

        v.valid_from = None;
        v.status = Status::Inactive;
        assert!(ensure_usable(&v, now).is_err());
    }
}
