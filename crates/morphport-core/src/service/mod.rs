//! # Schema Service
//!
//! The three read operations the engine consumes, behind `SchemaSource` so the
//! cache can be fed by the HTTP client or by an in-memory source in tests.

pub mod http;

pub use http::HttpSchemaSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entry of the category list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub value: String,
}

/// An entry of a category's model list. `value` is the model id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    pub value: String,
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn categories(&self) -> anyhow::Result<Vec<Category>>;

    async fn models(&self, category: &str) -> anyhow::Result<Vec<ModelRef>>;

    /// The model's parameter schema, `None` when the service has none for it.
    async fn model_schema(&self, model_id: &str) -> anyhow::Result<Option<Value>>;
}
