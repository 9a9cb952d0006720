//! JSON-schema helpers shared by every tool group.

use crate::core::config::data::looks_like_placeholder;
use crate::core::error::ToolError;
use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Regex for `#RRGGBB` colour values.
pub const HEX_COLOR_PATTERN: &str = "^#[0-9a-fA-F]{6}$";

pub fn compile(schema: &Value) -> Result<Validator, String> {
    jsonschema::validator_for(schema).map_err(|err| err.to_string())
}

/// Collects every violation as a `; ` separated list.
pub fn violations(validator: &Validator, instance: &Value) -> Option<String> {
    let messages: Vec<String> = validator
        .iter_errors(instance)
        .map(|error| error.to_string())
        .collect();
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

/// Fills absent top-level properties from their `default` keyword.
pub fn apply_defaults(schema: &Value, args: &mut Value) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let Some(object) = args.as_object_mut() else {
        return;
    };
    for (name, property) in properties {
        if let Some(default) = property.get("default") {
            object
                .entry(name.clone())
                .or_insert_with(|| default.clone());
        }
    }
}

/// Finds the first identifier argument whose value is a template
/// placeholder. Identifier keys end in `Id` or `_id`; nested objects and
/// arrays are searched too.
pub fn find_placeholder_id(args: &Value) -> Option<(String, String)> {
    match args {
        Value::Object(map) => find_in_object(map),
        Value::Array(items) => items.iter().find_map(find_placeholder_id),
        _ => None,
    }
}

fn find_in_object(map: &Map<String, Value>) -> Option<(String, String)> {
    for (key, value) in map {
        if let Value::String(text) = value {
            if is_identifier_key(key) && looks_like_placeholder(text) {
                return Some((key.clone(), text.clone()));
            }
        } else if let Some(found) = find_placeholder_id(value) {
            return Some(found);
        }
    }
    None
}

fn is_identifier_key(key: &str) -> bool {
    key.ends_with("Id") || key.ends_with("_id")
}

/// Deserializes already-validated arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(operation: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|err| ToolError::ValidationError {
        operation: operation.to_string(),
        details: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_only_missing_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "default": 10},
                "includeMetadata": {"type": "boolean", "default": true}
            }
        });
        let mut args = json!({"limit": 3});
        apply_defaults(&schema, &mut args);
        assert_eq!(args, json!({"limit": 3, "includeMetadata": true}));
    }

    #[test]
    fn placeholders_are_found_in_nested_identifier_keys() {
        let args = json!({
            "filePath": "/tmp/your_file_here.png",
            "logoFile": {"user_id": "placeholder-user"}
        });
        assert_eq!(
            find_placeholder_id(&args),
            Some(("user_id".to_string(), "placeholder-user".to_string()))
        );
    }

    #[test]
    fn real_identifiers_and_non_identifier_keys_pass() {
        let args = json!({
            "organizationId": "org-42",
            "browserTabTitle": "your_title_here",
            "items": [{"fileDocumentId": "doc-7"}]
        });
        assert_eq!(find_placeholder_id(&args), None);
    }

    #[test]
    fn violations_are_joined() {
        let schema = json!({
            "type": "object",
            "properties": {"limit": {"type": "integer", "minimum": 1}},
            "required": ["name"]
        });
        let validator = compile(&schema).expect("schema compiles");
        let report = violations(&validator, &json!({"limit": 0})).expect("invalid");
        assert!(report.contains("name"));
        assert!(report.contains("; "));
        assert!(violations(&validator, &json!({"name": "x", "limit": 1})).is_none());
    }
}
