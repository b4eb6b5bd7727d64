//! # MorphPort Inspector
//!
//! Headless schema handling for dynamic parameter nodes: parsing a model's
//! parameter schema into descriptors and deriving the controls that edit them.

pub mod descriptor;
pub mod naming;
pub mod parser;
pub mod schema;

pub use descriptor::{DisplayType, ItemType, ParameterDescriptor};
pub use parser::{SchemaParseError, parse};
pub use schema::{FieldType, VisualField};

use serde_json::Value;
use std::collections::HashMap;

/// Validation state for one node's parameter controls.
#[derive(Clone, Debug, Default)]
pub struct InspectorState {
    /// The fields to validate, in display order.
    pub fields: Vec<VisualField>,
    /// Validation errors keyed by field id.
    pub errors: HashMap<String, String>,
}

impl InspectorState {
    pub fn new(fields: Vec<VisualField>) -> Self {
        Self {
            fields,
            errors: HashMap::new(),
        }
    }

    pub fn from_descriptors(descriptors: &[ParameterDescriptor]) -> Self {
        Self::new(descriptors.iter().map(VisualField::from_descriptor).collect())
    }

    /// Validates a specific field against its current value.
    ///
    /// `None` means the value is supplied elsewhere (e.g. by a wire) and the
    /// field is not checked.
    pub fn validate_field(&mut self, field_id: &str, value: Option<&Value>) {
        let Some(field) = self.fields.iter().find(|f| f.id == field_id) else {
            return;
        };
        let missing = match value {
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            _ => false,
        };
        if field.required && missing {
            self.errors
                .insert(field_id.to_string(), "Required".to_string());
        } else {
            self.errors.remove(field_id);
        }
    }

    /// Validates every field; `lookup` returns `None` for wired fields.
    pub fn validate<'a>(&mut self, lookup: impl Fn(&str) -> Option<&'a Value>) {
        let ids: Vec<String> = self.fields.iter().map(|f| f.id.clone()).collect();
        for id in ids {
            let value = lookup(&id);
            self.validate_field(&id, value);
        }
    }

    /// Returns true if all fields are valid.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
