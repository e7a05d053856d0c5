//! Tool parameter schemas.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON Schema-like input contract of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    /// JSON Schema object describing the parameters.
    pub schema: Value,
}

impl ToolParameters {
    /// Create from a raw JSON Schema value.
    pub fn from_schema(schema: Value) -> Self {
        Self { schema }
    }

    /// Create an empty parameter schema (no parameters).
    pub fn empty() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for constructing tool parameter schemas.
pub struct ParameterBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    fn property(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    /// Add a string property.
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            json!({"type": "string", "description": description}),
            required,
        )
    }

    /// Add a non-empty string property.
    pub fn non_empty_string(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            json!({"type": "string", "description": description, "minLength": 1}),
            required,
        )
    }

    /// Add a `YYYY-MM-DD` date property.
    pub fn date(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            json!({"type": "string", "format": "date", "description": description}),
            required,
        )
    }

    /// Add an `HH:MM` time property.
    pub fn time(self, name: &str, description: &str, required: bool) -> Self {
        self.property(
            name,
            json!({"type": "string", "format": "time", "description": description}),
            required,
        )
    }

    /// Add an integer property bounded to `[min, max]`.
    pub fn integer(self, name: &str, description: &str, min: i64, max: i64, required: bool) -> Self {
        self.property(
            name,
            json!({
                "type": "integer",
                "description": description,
                "minimum": min,
                "maximum": max,
            }),
            required,
        )
    }

    /// Add a number property bounded to `[min, max]`.
    pub fn number(self, name: &str, description: &str, min: f64, max: f64, required: bool) -> Self {
        self.property(
            name,
            json!({
                "type": "number",
                "description": description,
                "minimum": min,
                "maximum": max,
            }),
            required,
        )
    }

    /// Add an enum (string) property.
    pub fn string_enum(self, name: &str, description: &str, values: &[&str], required: bool) -> Self {
        self.property(
            name,
            json!({"type": "string", "description": description, "enum": values}),
            required,
        )
    }

    /// Build into ToolParameters.
    pub fn build(self) -> ToolParameters {
        ToolParameters {
            schema: json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_bounds_and_required_fields() {
        let params = ToolParameters::object()
            .non_empty_string("name", "Tier name", true)
            .integer("capacity", "Seats", 1, 500, false)
            .build();

        assert_eq!(params.schema["required"], json!(["name"]));
        assert_eq!(params.schema["properties"]["capacity"]["minimum"], 1);
        assert_eq!(params.schema["properties"]["name"]["minLength"], 1);
    }
}
