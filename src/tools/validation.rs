//! Validate tool call arguments against a tool's schema before execution.
//!
//! Supported keywords: `type`, `required`, `properties`, `minimum`,
//! `maximum`, `enum`, `minLength` and `format` (`date`, `time`).

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::error::ToolValidationError;

/// Validate `args` for `tool` against `schema`, reporting the first
/// violation found.
pub fn validate_arguments(
    tool: &str,
    args: &Value,
    schema: &Value,
) -> Result<(), ToolValidationError> {
    let reject = |field: Option<&str>, message: String| Err(ToolValidationError::new(tool, field, message));

    if schema.get("type").and_then(Value::as_str) == Some("object") && !args.is_object() {
        return reject(
            None,
            format!("expected object arguments, got {}", json_type_name(args)),
        );
    }
    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if obj.get(name).map_or(true, Value::is_null) {
                return reject(Some(name), format!("missing required field '{name}'"));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        // Explicit nulls mean "not provided".
        if value.is_null() {
            continue;
        }
        let Some(prop) = properties.get(key) else {
            continue;
        };
        if let Err(message) = check_property(value, prop) {
            return reject(Some(key), format!("field '{key}' {message}"));
        }
    }

    Ok(())
}

fn check_property(value: &Value, prop: &Value) -> Result<(), String> {
    if let Some(expected) = prop.get("type").and_then(Value::as_str) {
        if !value_matches_type(value, expected) {
            return Err(format!(
                "expected type '{expected}', got {}",
                json_type_name(value)
            ));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = prop.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(format!("must be at least {}, got {}", fmt_num(min), value));
            }
        }
        if let Some(max) = prop.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(format!("must be at most {}, got {}", fmt_num(max), value));
            }
        }
    }

    if let Some(s) = value.as_str() {
        if let Some(min_len) = prop.get("minLength").and_then(Value::as_u64) {
            if (s.trim().chars().count() as u64) < min_len {
                return Err(format!("must be at least {min_len} character(s) long"));
            }
        }
        match prop.get("format").and_then(Value::as_str) {
            Some("date") if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() => {
                return Err(format!("must be a date in YYYY-MM-DD format, got '{s}'"));
            }
            Some("time") if crate::event::draft::parse_time(s).is_none() => {
                return Err(format!("must be a time in HH:MM format, got '{s}'"));
            }
            _ => {}
        }
    }

    if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("must be one of {}", Value::Array(allowed.clone())));
        }
    }

    Ok(())
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
