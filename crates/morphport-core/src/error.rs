use host_canvas::HostError;
use thiserror::Error;

/// Errors raised by the dynamic node engine.
///
/// Network failures never reach a host hook: the schema cache degrades them to
/// empty results. These variants surface from the explicit API only.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Schema service request failed: {0}")]
    Service(#[from] anyhow::Error),

    #[error("Malformed {what} blob: {source}")]
    MalformedBlob {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot build a control for '{name}': {reason}")]
    Control { name: String, reason: String },

    #[error("No live dynamic node with uuid {0}")]
    UnknownNode(uuid::Uuid),

    #[error(transparent)]
    Host(#[from] HostError),
}
