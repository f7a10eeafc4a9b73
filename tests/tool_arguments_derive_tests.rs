#[cfg(test)]
mod tool_arguments_derive_tests {
    use mcp_session::{ToolArguments, ToolArgumentsDescriptor};
    use serde_json::{json, Value};

    fn required_of(schema: &Value) -> Vec<String> {
        schema["required"].as_array().map_or_else(Vec::new, |fields| {
            fields
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect()
        })
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct SearchArgs {
        query: String,
        limit: u32,
        exact: bool,
        boost: f64,
    }

    #[test]
    fn primitive_fields() {
        let schema = SearchArgs::input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["properties"]["exact"]["type"], "boolean");
        assert_eq!(schema["properties"]["boost"]["type"], "number");
        assert_eq!(required_of(&schema), vec!["query", "limit", "exact", "boost"]);
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct ReadLogArgs {
        name: String,
        tail: Option<u32>,
    }

    #[test]
    fn option_fields_are_not_required() {
        let schema = ReadLogArgs::input_schema();
        assert_eq!(schema["properties"]["tail"]["type"], "integer");
        assert_eq!(required_of(&schema), vec!["name"]);
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct Everything {
        flag: Option<bool>,
    }

    #[test]
    fn no_required_fields_omits_required() {
        let schema = Everything::input_schema();
        assert!(schema.get("required").is_none());
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct BatchArgs {
        paths: Vec<String>,
        weights: Vec<i64>,
        labels: std::collections::HashMap<String, String>,
        extra: Value,
    }

    #[test]
    fn collections_and_raw_values() {
        let schema = BatchArgs::input_schema();
        assert_eq!(
            schema["properties"]["paths"],
            json!({ "type": "array", "items": { "type": "string" } })
        );
        assert_eq!(schema["properties"]["weights"]["items"]["type"], "integer");
        assert_eq!(schema["properties"]["labels"]["type"], "object");
        assert_eq!(schema["properties"]["extra"], json!({}));
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct AnnotatedArgs {
        #[tool_arg(desc = "Country to look up")]
        country: String,
        #[tool_arg(rename = "userId")]
        user_id: String,
        #[tool_arg(skip)]
        cache: u8,
        #[tool_arg(one_of = ["celsius", "fahrenheit"], desc = "Unit of temperature")]
        unit: Option<String>,
    }

    #[test]
    fn field_attributes() {
        let schema = AnnotatedArgs::input_schema();
        let properties = &schema["properties"];

        assert_eq!(properties["country"]["description"], "Country to look up");
        assert!(properties.get("user_id").is_none());
        assert_eq!(properties["userId"]["type"], "string");
        assert!(properties.get("cache").is_none());
        assert_eq!(
            properties["unit"],
            json!({
                "type": "string",
                "description": "Unit of temperature",
                "enum": ["celsius", "fahrenheit"]
            })
        );
        assert_eq!(required_of(&schema), vec!["country", "userId"]);
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct RequiredOverrides {
        #[tool_arg(required = false)]
        name: String,
        #[tool_arg(required = true)]
        code: Option<i32>,
    }

    #[test]
    fn required_can_be_overridden() {
        let schema = RequiredOverrides::input_schema();
        assert_eq!(required_of(&schema), vec!["code"]);
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct Location {
        city: String,
        #[tool_arg(desc = "ISO 3166 code")]
        country: Option<String>,
    }

    #[derive(ToolArguments)]
    #[allow(dead_code)]
    struct TripArgs {
        origin: Location,
        stopover: Option<Location>,
        #[tool_arg(desc = "Places to visit")]
        destinations: Vec<Location>,
    }

    #[test]
    fn nested_structs_embed_their_schema() {
        let location = json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "country": { "type": "string", "description": "ISO 3166 code" }
            },
            "required": ["city"]
        });
        assert_eq!(Location::input_schema(), location);

        let trip = TripArgs::input_schema();
        assert_eq!(trip["properties"]["origin"], location);
        assert_eq!(trip["properties"]["stopover"], location);
        assert_eq!(trip["properties"]["destinations"]["items"], location);
        assert_eq!(trip["properties"]["destinations"]["description"], "Places to visit");
        assert_eq!(required_of(&trip), vec!["origin", "destinations"]);
    }
}
