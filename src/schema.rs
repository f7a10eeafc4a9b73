//! Parameter-schema capability used to validate and describe tool arguments.
//!
//! The session only ever talks to [`ParameterSchema`]. Concrete schema engines
//! plug in through adapters:
//!
//! * [`TypedSchema`]: a Rust struct deriving `ToolArguments` + `Deserialize`.
//! * `JsonSchema` (feature `schema-validation`): a raw JSON Schema document
//!   checked with the `jsonschema` crate.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Validates tool arguments and describes their shape as JSON Schema.
pub trait ParameterSchema: Send + Sync {
    /// Returns the (possibly normalized) arguments, or the list of problems found.
    fn validate(&self, value: &Value) -> Result<Value, Vec<String>>;

    /// A JSON-Schema-like description, sent as the tool's `inputSchema`.
    fn describe(&self) -> Value;
}

/// Implemented by `#[derive(ToolArguments)]`.
pub trait ToolArgumentsDescriptor {
    fn input_schema() -> Value;
}

/// Adapter for argument structs: validation is deserialization.
pub struct TypedSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: ToolArgumentsDescriptor + DeserializeOwned,
{
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedSchema<T>
where
    T: ToolArgumentsDescriptor + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ParameterSchema for TypedSchema<T>
where
    T: ToolArgumentsDescriptor + DeserializeOwned,
{
    fn validate(&self, value: &Value) -> Result<Value, Vec<String>> {
        // Missing arguments deserialize like an empty object so structs made
        // only of optional fields still validate.
        let candidate = match value {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        match serde_json::from_value::<T>(candidate.clone()) {
            Ok(_) => Ok(candidate),
            Err(e) => Err(vec![e.to_string()]),
        }
    }

    fn describe(&self) -> Value {
        T::input_schema()
    }
}

#[cfg(feature = "schema-validation")]
pub use json_schema::JsonSchema;

#[cfg(feature = "schema-validation")]
mod json_schema {
    use super::ParameterSchema;
    use crate::error::{Error, Result};
    use serde_json::Value;

    /// Adapter for a raw JSON Schema document.
    pub struct JsonSchema {
        schema: Value,
        validator: jsonschema::Validator,
    }

    impl JsonSchema {
        /// Compiles the schema; fails if the document itself is invalid.
        pub fn new(schema: Value) -> Result<Self> {
            let validator = jsonschema::validator_for(&schema)
                .map_err(|e| Error::Other(format!("Invalid JSON schema: {}", e)))?;
            Ok(Self { schema, validator })
        }
    }

    impl ParameterSchema for JsonSchema {
        fn validate(&self, value: &Value) -> std::result::Result<Value, Vec<String>> {
            let errors: Vec<String> = self
                .validator
                .iter_errors(value)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect();
            if errors.is_empty() {
                Ok(value.clone())
            } else {
                Err(errors)
            }
        }

        fn describe(&self) -> Value {
            self.schema.clone()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn reports_each_violation() {
            let schema = JsonSchema::new(json!({
                "type": "object",
                "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
                "required": ["a", "b"]
            }))
            .unwrap();

            assert!(schema.validate(&json!({ "a": 1, "b": 2 })).is_ok());
            let errors = schema.validate(&json!({ "a": "x" })).unwrap_err();
            assert_eq!(errors.len(), 2);
            assert_eq!(schema.describe()["required"], json!(["a", "b"]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolArguments;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(ToolArguments, Deserialize)]
    #[allow(dead_code)]
    struct AddArgs {
        #[tool_arg(desc = "Left operand")]
        a: f64,
        b: f64,
    }

    #[derive(ToolArguments, Deserialize)]
    #[allow(dead_code)]
    struct Filter {
        query: Option<String>,
    }

    #[test]
    fn typed_schema_validates_by_deserializing() {
        let schema = TypedSchema::<AddArgs>::new();
        assert_eq!(
            schema.validate(&json!({ "a": 1, "b": 2 })).unwrap(),
            json!({ "a": 1, "b": 2 })
        );

        let errors = schema.validate(&json!({ "a": "one", "b": 2 })).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(schema.validate(&json!({ "a": 1 })).is_err());
    }

    #[test]
    fn typed_schema_treats_null_as_empty_object() {
        let schema = TypedSchema::<Filter>::new();
        assert_eq!(schema.validate(&Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn typed_schema_describes_with_derived_schema() {
        let described = TypedSchema::<AddArgs>::new().describe();
        assert_eq!(described["type"], "object");
        assert_eq!(described["properties"]["a"]["description"], "Left operand");
        assert_eq!(described["required"], json!(["a", "b"]));
    }
}
