//! Lenient field deserialization.
//!
//! Field data arrives from CSV imports and hand-edited JSON, so numbers show up
//! as JSON numbers, numeric strings ("18.5"), empty strings or junk. Anything
//! that does not coerce to a finite number is treated as absent.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a JSON value to a finite `f64`.
///
/// Numbers and numeric strings are accepted. `null`, blank strings, booleans,
/// containers and non-finite results all yield `None`.
pub fn finite_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Keep only finite values.
pub fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// `deserialize_with` helper for `Option<f64>` fields.
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(finite_number))
}

/// Coerce a scalar JSON value to text. Numbers keep their JSON spelling.
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerce a JSON value to a flag; `None` unless it reads as yes or no.
pub fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// `deserialize_with` helper for free-form text fields that may arrive as numbers.
pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(text))
}

/// `deserialize_with` helper for identifiers: text or numbers, anything else is empty.
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string(deserializer)?.unwrap_or_default())
}

/// `deserialize_with` helper for scalar fields forwarded with their JSON type intact.
///
/// `null`, arrays and objects are treated as absent.
pub fn opt_scalar<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.filter(|v| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))))
}

/// `deserialize_with` helper for flags that may arrive as strings ("true", "yes", "1").
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_flag(deserializer)?.unwrap_or(false))
}

/// Like [`flag`] but keeps "not recorded" apart from `false`.
pub fn opt_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(truthy))
}
