//! # Schema Parser
//!
//! Turns a JSON-Schema-like parameter schema into an ordered list of
//! [`ParameterDescriptor`]s.
//!
//! Normalization rules:
//! - Order follows `x-order-properties` when present; properties it does not
//!   list are appended in declaration order.
//! - Properties flagged `disabled`, `hidden` or `x-hidden` are dropped.
//! - A property with an `enum` is always `ENUM`, whatever its primitive type.
//! - Numeric properties take `minimum`/`maximum`; `step` falls back to 1 for
//!   integers and 0.01 for floats.
//! - Defaults of free-form fields whose name suggests media or text content
//!   are blanked, so controls never start pre-filled with the schema author's
//!   sample content. This is a deliberate lossy normalization.

use crate::descriptor::{DisplayType, ItemType, ParameterDescriptor};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key of the explicit ordering hint.
pub const ORDER_HINT_KEY: &str = "x-order-properties";

const BLANKED_DEFAULT_MARKERS: &[&str] = &[
    "image",
    "video",
    "audio",
    "url",
    "prompt",
    "text",
    "description",
];

const INT_STEP: f64 = 1.0;
const FLOAT_STEP: f64 = 0.01;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaParseError {
    #[error("Schema must be a JSON object")]
    NotAnObject,

    #[error("Schema has no 'properties' object")]
    MissingProperties,
}

/// Parses a parameter schema into descriptors, in display order.
pub fn parse(schema: &Value) -> Result<Vec<ParameterDescriptor>, SchemaParseError> {
    let schema = schema.as_object().ok_or(SchemaParseError::NotAnObject)?;
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .ok_or(SchemaParseError::MissingProperties)?;

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let descriptors = ordered_names(schema, properties)
        .into_iter()
        .filter_map(|name| {
            let property = properties.get(name)?.as_object()?;
            if is_suppressed(property) {
                tracing::debug!(parameter = name, "Dropping hidden schema property");
                return None;
            }
            Some(describe(name, property, required.contains(&name)))
        })
        .collect();

    Ok(descriptors)
}

fn ordered_names<'a>(schema: &'a Map<String, Value>, properties: &'a Map<String, Value>) -> Vec<&'a str> {
    let hinted = schema
        .get(ORDER_HINT_KEY)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter(|n| properties.contains_key(*n));

    let mut names: Vec<&str> = Vec::with_capacity(properties.len());
    for name in hinted.chain(properties.keys().map(String::as_str)) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn is_suppressed(property: &Map<String, Value>) -> bool {
    ["disabled", "hidden", "x-hidden"]
        .iter()
        .any(|flag| property.get(*flag).and_then(Value::as_bool) == Some(true))
}

/// Resolves the declared primitive type, looking through nullable unions.
fn declared_type(property: &Map<String, Value>) -> Option<&str> {
    match property.get("type") {
        Some(Value::String(t)) => return Some(t.as_str()),
        Some(Value::Array(types)) => {
            return types.iter().filter_map(Value::as_str).find(|t| *t != "null");
        }
        _ => {}
    }

    ["anyOf", "oneOf"]
        .iter()
        .filter_map(|key| property.get(*key)?.as_array())
        .flatten()
        .filter_map(|variant| variant.as_object())
        .find_map(|variant| declared_type(variant).filter(|t| *t != "null"))
}

fn describe(name: &str, property: &Map<String, Value>, listed_required: bool) -> ParameterDescriptor {
    let mut descriptor = ParameterDescriptor::new(name, DisplayType::String);
    descriptor.required =
        listed_required || property.get("required").and_then(Value::as_bool) == Some(true);
    descriptor.description = property
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let enum_options = property
        .get("enum")
        .and_then(Value::as_array)
        .filter(|options| !options.is_empty());

    if let Some(options) = enum_options {
        descriptor.display_type = DisplayType::Enum;
        descriptor.enum_options = options.clone();
    } else {
        match declared_type(property).unwrap_or("string") {
            "integer" => descriptor.display_type = DisplayType::Int,
            "number" => descriptor.display_type = DisplayType::Float,
            "boolean" => descriptor.display_type = DisplayType::Boolean,
            "object" => descriptor.display_type = DisplayType::Object,
            "array" => {
                let item_type = property
                    .get("items")
                    .and_then(Value::as_object)
                    .and_then(declared_type)
                    .map(ItemType::from_schema)
                    .unwrap_or(ItemType::String);
                descriptor.is_array = true;
                descriptor.array_item_type = Some(item_type);
                // Arrays of primitives are edited as comma-separated text.
                descriptor.display_type = if item_type == ItemType::Object {
                    DisplayType::Object
                } else {
                    DisplayType::String
                };
            }
            _ => descriptor.display_type = DisplayType::String,
        }
    }

    if descriptor.is_numeric() {
        descriptor.min = property.get("minimum").and_then(Value::as_f64);
        descriptor.max = property.get("maximum").and_then(Value::as_f64);
        descriptor.step = property
            .get("step")
            .or_else(|| property.get("multipleOf"))
            .and_then(Value::as_f64)
            .or(Some(if descriptor.display_type == DisplayType::Int {
                INT_STEP
            } else {
                FLOAT_STEP
            }));
    }

    descriptor.default = match property.get("default") {
        None | Some(Value::Null) => None,
        Some(_) if blanks_default(&descriptor) => None,
        Some(value) => Some(value.clone()),
    };

    descriptor
}

fn blanks_default(descriptor: &ParameterDescriptor) -> bool {
    if descriptor.display_type == DisplayType::Enum {
        return false;
    }
    let name = descriptor.name.to_lowercase();
    BLANKED_DEFAULT_MARKERS.iter().any(|m| name.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(descriptors: &[ParameterDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_declaration_order_and_types() {
        let schema = json!({
            "type": "object",
            "required": ["prompt"],
            "properties": {
                "prompt": {"type": "string", "description": "What to draw"},
                "seed": {"type": "integer", "default": -1},
                "width": {"type": "integer", "minimum": 256, "maximum": 1440, "default": 512}
            }
        });

        let parsed = parse(&schema).unwrap();
        assert_eq!(names(&parsed), vec!["prompt", "seed", "width"]);

        assert_eq!(parsed[0].display_type, DisplayType::String);
        assert!(parsed[0].required);
        assert_eq!(parsed[0].description, "What to draw");

        assert_eq!(parsed[1].display_type, DisplayType::Int);
        assert!(!parsed[1].required);
        assert_eq!(parsed[1].default, Some(json!(-1)));
        assert_eq!(parsed[1].step, Some(1.0));

        assert_eq!(parsed[2].min, Some(256.0));
        assert_eq!(parsed[2].max, Some(1440.0));
        assert_eq!(parsed[2].default, Some(json!(512)));
    }

    #[test]
    fn test_order_hint_wins_and_keeps_unlisted() {
        let schema = json!({
            "x-order-properties": ["width", "prompt"],
            "properties": {
                "prompt": {"type": "string"},
                "seed": {"type": "integer"},
                "width": {"type": "integer"}
            }
        });

        let parsed = parse(&schema).unwrap();
        assert_eq!(names(&parsed), vec!["width", "prompt", "seed"]);
    }

    #[test]
    fn test_hidden_properties_dropped() {
        let schema = json!({
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "string", "disabled": true},
                "c": {"type": "string", "hidden": true},
                "d": {"type": "string", "x-hidden": true},
                "e": {"type": "string", "hidden": false}
            }
        });

        let parsed = parse(&schema).unwrap();
        assert_eq!(names(&parsed), vec!["a", "e"]);
    }

    #[test]
    fn test_enum_forces_enum_display() {
        let schema = json!({
            "properties": {
                "steps": {"type": "integer", "enum": [10, 20, 30], "default": 20},
                "image_size": {"type": "string", "enum": ["square", "portrait"], "default": "square"}
            }
        });

        let parsed = parse(&schema).unwrap();
        assert_eq!(parsed[0].display_type, DisplayType::Enum);
        assert_eq!(parsed[0].enum_options, vec![json!(10), json!(20), json!(30)]);
        assert_eq!(parsed[0].step, None);
        // Enum defaults are never blanked, even when the name looks like media.
        assert_eq!(parsed[1].default, Some(json!("square")));
    }

    #[test]
    fn test_float_step_and_multiple_of() {
        let schema = json!({
            "properties": {
                "guidance_scale": {"type": "number", "minimum": 0, "maximum": 10},
                "strength": {"type": "number", "multipleOf": 0.05}
            }
        });

        let parsed = parse(&schema).unwrap();
        assert_eq!(parsed[0].display_type, DisplayType::Float);
        assert_eq!(parsed[0].step, Some(0.01));
        assert_eq!(parsed[1].step, Some(0.05));
    }

    #[test]
    fn test_content_defaults_blanked() {
        let schema = json!({
            "properties": {
                "image_url": {"type": "string", "default": "https://example.com/cat.png"},
                "negative_prompt": {"type": "string", "default": "blurry"},
                "duration": {"type": "integer", "default": 5}
            }
        });

        let parsed = parse(&schema).unwrap();
        assert_eq!(parsed[0].default, None);
        assert_eq!(parsed[1].default, None);
        assert_eq!(parsed[2].default, Some(json!(5)));
    }

    #[test]
    fn test_arrays_and_nullable_unions() {
        let schema = json!({
            "properties": {
                "images": {"type": "array", "items": {"type": "string"}},
                "sizes": {"type": "array", "items": {"type": "integer"}},
                "masks": {"type": "array", "items": {"type": "object"}},
                "loras": {"anyOf": [{"type": "null"}, {"type": "number"}]},
                "ratio": {"type": ["null", "number"]}
            }
        });

        let parsed = parse(&schema).unwrap();
        assert!(parsed[0].is_array);
        assert_eq!(parsed[0].array_item_type, Some(ItemType::String));
        assert_eq!(parsed[0].display_type, DisplayType::String);
        assert_eq!(parsed[1].array_item_type, Some(ItemType::Integer));
        assert_eq!(parsed[2].display_type, DisplayType::Object);
        assert!(!parsed[2].is_wire_eligible());
        assert_eq!(parsed[3].display_type, DisplayType::Float);
        assert_eq!(parsed[4].display_type, DisplayType::Float);
    }

    #[test]
    fn test_malformed_schema() {
        assert_eq!(parse(&json!([])), Err(SchemaParseError::NotAnObject));
        assert_eq!(
            parse(&json!({"type": "object"})),
            Err(SchemaParseError::MissingProperties)
        );
    }
}
