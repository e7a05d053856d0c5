//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::ToolValidationError;

/// Validated arguments of one tool call.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    tool: String,
    value: Value,
}

impl ToolArguments {
    pub fn new(tool: impl Into<String>, value: Value) -> Self {
        Self {
            tool: tool.into(),
            value,
        }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, ToolValidationError> {
        self.get_str_opt(key)
            .ok_or_else(|| self.missing(key, "string"))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, ToolValidationError> {
        self.value
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.missing(key, "number"))
    }

    /// Get an optional integer argument.
    pub fn get_i64_opt(&self, key: &str) -> Option<i64> {
        self.value.get(key).and_then(Value::as_i64)
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ToolValidationError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| ToolValidationError::new(&self.tool, None, e.to_string()))
    }

    fn missing(&self, key: &str, kind: &str) -> ToolValidationError {
        ToolValidationError::new(&self.tool, Some(key), format!("missing {kind} argument: {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_getters_report_the_field() {
        let args = ToolArguments::new("add_ticket_type", json!({"name": "Child", "price": 12.5}));
        assert_eq!(args.get_str("name").unwrap(), "Child");
        assert_eq!(args.get_f64("price").unwrap(), 12.5);
        assert_eq!(args.get_i64_opt("capacity"), None);

        let err = args.get_f64("fee").unwrap_err();
        assert_eq!(err.field.as_deref(), Some("fee"));
        assert_eq!(err.tool, "add_ticket_type");
    }

    #[test]
    fn deserialize_failures_are_validation_errors() {
        #[derive(serde::Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            count: u8,
        }
        let args = ToolArguments::new("t", json!({"count": 900}));
        assert!(args.deserialize::<Needs>().is_err());
    }
}
