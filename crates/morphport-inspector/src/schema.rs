use crate::descriptor::{DisplayType, ParameterDescriptor};
use crate::naming::{display_name, tooltip};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a parameter control is edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    Text {
        multiline: bool,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
        step: f64,
        integer: bool,
    },
    Boolean,
    Select {
        options: Vec<Value>,
    },
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualField {
    pub id: String,
    pub label: String,
    pub tooltip: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default_value: Option<Value>,
}

impl VisualField {
    pub fn from_descriptor(descriptor: &ParameterDescriptor) -> Self {
        let field_type = match descriptor.display_type {
            DisplayType::Enum => FieldType::Select {
                options: descriptor.enum_options.clone(),
            },
            DisplayType::Boolean => FieldType::Boolean,
            DisplayType::Object => FieldType::Json,
            DisplayType::Int | DisplayType::Float if !descriptor.is_array => {
                let integer = descriptor.display_type == DisplayType::Int;
                FieldType::Number {
                    min: descriptor.min,
                    max: descriptor.max,
                    step: descriptor.step.unwrap_or(if integer { 1.0 } else { 0.01 }),
                    integer,
                }
            }
            _ => FieldType::Text {
                multiline: is_long_text(&descriptor.name),
            },
        };

        Self {
            id: descriptor.name.clone(),
            label: display_name(&descriptor.name),
            tooltip: tooltip(descriptor),
            field_type,
            required: descriptor.required,
            default_value: descriptor.default.clone(),
        }
    }

    /// The value a fresh control starts with.
    pub fn initial_value(&self) -> Value {
        if let Some(default) = &self.default_value {
            return default.clone();
        }
        match &self.field_type {
            FieldType::Text { .. } => Value::String(String::new()),
            FieldType::Number { min, integer, .. } => {
                let start = min.unwrap_or(0.0).max(0.0);
                if *integer {
                    Value::from(start as i64)
                } else {
                    Value::from(start)
                }
            }
            FieldType::Boolean => Value::Bool(false),
            FieldType::Select { options } => options.first().cloned().unwrap_or(Value::Null),
            FieldType::Json => Value::Null,
        }
    }
}

fn is_long_text(name: &str) -> bool {
    let name = name.to_lowercase();
    ["prompt", "text", "description"]
        .iter()
        .any(|marker| name.contains(marker))
}
