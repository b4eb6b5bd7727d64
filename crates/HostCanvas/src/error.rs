use thiserror::Error;

/// Errors raised by the editor mutation API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Node type '{0}' is not registered")]
    UnknownNodeType(String),

    #[error("Node not found in the graph")]
    NodeNotFound,

    #[error("Node '{node_type}' has no {kind} slot at index {index}")]
    SlotOutOfRange {
        node_type: String,
        kind: &'static str,
        index: usize,
    },

    #[error("Node '{node_type}' has no widget named '{name}'")]
    WidgetNotFound { node_type: String, name: String },
}
