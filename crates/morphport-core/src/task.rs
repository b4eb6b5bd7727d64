//! # Backend Task Assembly
//!
//! What the backend does with a rewritten dynamic node: merge the values
//! arriving on placeholder inputs into the stored request body, under the
//! parameter names the mapping records.

use crate::components::HIDDEN_FIELDS;
use crate::pool::ParameterMapping;
use host_canvas::{PromptInput, PromptNode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Output of a dynamic node: the model to run and its request body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    #[serde(rename = "modelUUID")]
    pub model_uuid: String,
    #[serde(rename = "requestJson")]
    pub request_json: Map<String, Value>,
}

impl TaskInfo {
    pub fn api_path(&self) -> String {
        format!("/api/v3/{}", self.model_uuid)
    }

    pub fn build_payload(&self) -> Value {
        Value::Object(self.request_json.clone())
    }
}

/// Builds the task from the three hidden fields and the placeholder inputs.
///
/// Malformed `request_json` or `param_map` count as empty. A placeholder whose
/// value is its own name carries nothing.
pub fn assemble(
    model_id: &str,
    request_json: &str,
    param_map: &str,
    placeholders: &BTreeMap<String, Value>,
) -> TaskInfo {
    let mut request = match serde_json::from_str::<Value>(request_json) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) if request_json.trim().is_empty() => Map::new(),
        _ => {
            tracing::warn!(model_id, "Ignoring malformed request_json");
            Map::new()
        }
    };

    let mapping = ParameterMapping::parse_lenient(param_map);
    for (name, binding) in mapping.iter() {
        let placeholder = binding.placeholder.name();
        let Some(value) = placeholders.get(&placeholder) else {
            continue;
        };
        if value.as_str() == Some(placeholder.as_str()) {
            continue;
        }
        let converted = binding.backend_type.coerce(value);
        tracing::debug!(parameter = %name, %placeholder, backend_type = ?binding.backend_type, "Mapped placeholder value");
        request.insert(name.clone(), converted);
    }

    TaskInfo {
        model_uuid: model_id.to_string(),
        request_json: request,
    }
}

/// Assembles the task of a rewritten prompt node. `resolve` produces the value
/// behind a link to `(origin, slot)`.
///
/// `None` when the node has no model selected.
pub fn from_prompt_node(
    node: &PromptNode,
    resolve: impl Fn(&str, usize) -> Option<Value>,
) -> Option<TaskInfo> {
    let field = |name: &str| match node.inputs.get(name) {
        Some(PromptInput::Value(Value::String(s))) => s.as_str(),
        _ => "",
    };
    let [model_id, request_json, param_map] = HIDDEN_FIELDS.map(field);
    if model_id.is_empty() {
        return None;
    }

    let placeholders: BTreeMap<String, Value> = node
        .inputs
        .iter()
        .filter(|(name, _)| !HIDDEN_FIELDS.contains(&name.as_str()))
        .filter_map(|(name, input)| {
            let value = match input {
                PromptInput::Link(origin, slot) => resolve(origin, *slot)?,
                PromptInput::Value(value) => value.clone(),
            };
            Some((name.clone(), value))
        })
        .collect();

    Some(assemble(model_id, request_json, param_map, &placeholders))
}
