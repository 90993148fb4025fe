//! Reusable process callbacks
//!
//! Process callbacks transform a field's value after it is read, in the order
//! they were declared on the field.

use anyhow::Result;
use serde_json::{Value, json};

/// Trim whitespace from strings
pub fn trim() -> impl Fn(Value) -> Result<Value> + Send + Sync + Clone {
    |value: Value| match value.as_str() {
        Some(s) => Ok(Value::String(s.trim().to_string())),
        None => Ok(value),
    }
}

/// Uppercase strings
pub fn uppercase() -> impl Fn(Value) -> Result<Value> + Send + Sync + Clone {
    |value: Value| match value.as_str() {
        Some(s) => Ok(Value::String(s.to_uppercase())),
        None => Ok(value),
    }
}

/// Lowercase strings
pub fn lowercase() -> impl Fn(Value) -> Result<Value> + Send + Sync + Clone {
    |value: Value| match value.as_str() {
        Some(s) => Ok(Value::String(s.to_lowercase())),
        None => Ok(value),
    }
}

/// Round numbers to a number of decimal places
pub fn round_decimals(decimals: u32) -> impl Fn(Value) -> Result<Value> + Send + Sync + Clone {
    move |value: Value| match value.as_f64() {
        Some(num) if !value.is_i64() && !value.is_u64() => {
            let factor = 10_f64.powi(decimals as i32);
            Ok(json!((num * factor).round() / factor))
        }
        _ => Ok(value),
    }
}

/// Cast numeric strings to numbers (integers stay integers)
pub fn to_number() -> impl Fn(Value) -> Result<Value> + Send + Sync + Clone {
    |value: Value| {
        let Some(s) = value.as_str() else {
            return Ok(value);
        };
        if let Ok(int) = s.trim().parse::<i64>() {
            return Ok(json!(int));
        }
        match s.trim().parse::<f64>() {
            Ok(float) => Ok(json!(float)),
            Err(_) => Err(anyhow::anyhow!("'{}' is not a number", s)),
        }
    }
}
