//! # Execution Payload
//!
//! The shape a run request takes on its way to the backend: one entry per node,
//! keyed by the node's UUID, with each input either a literal or a link to
//! another node's output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single input value in the execution payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    /// `[origin_node_uuid, origin_slot]`
    Link(String, usize),
    Value(Value),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptMeta {
    pub title: String,
}

/// One node in the execution payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromptNode {
    pub class_type: String,
    pub inputs: BTreeMap<String, PromptInput>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PromptMeta>,
}

/// The full execution payload, keyed by node UUID.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptPayload {
    pub nodes: BTreeMap<String, PromptNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_input_wire_shape() {
        let mut inputs = BTreeMap::new();
        inputs.insert("a".to_string(), PromptInput::Link("n1".to_string(), 0));
        inputs.insert("b".to_string(), PromptInput::Value(json!(3)));
        let node = PromptNode {
            class_type: "T".to_string(),
            inputs,
            meta: None,
        };

        let encoded = serde_json::to_value(&node).unwrap();
        assert_eq!(
            encoded,
            json!({"class_type": "T", "inputs": {"a": ["n1", 0], "b": 3}})
        );

        let decoded: PromptNode = serde_json::from_value(encoded).unwrap();
        assert_eq!(
            decoded.inputs.get("a"),
            Some(&PromptInput::Link("n1".to_string(), 0))
        );
    }
}
