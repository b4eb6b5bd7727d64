//! # MorphPort Core Library
//!
//! Runtime for dynamic parameter nodes: a node whose visible inputs and
//! controls follow the schema of a model picked at edit time, while the backend
//! only ever sees a fixed set of placeholder inputs.
//!

pub mod components;
pub mod config;
pub mod error;
pub mod extension;
pub mod node;
pub mod pool;
pub mod service;
pub mod store;
pub mod systems;
pub mod task;

pub use config::EngineConfig;
pub use error::EngineError;
pub use extension::DynamicNodeExtension;
pub use node::{DYNAMIC_NODE_TYPE, DynamicNode, LiveNodes};
pub use pool::{BackendType, ParameterMapping, PlaceholderPool, SlotBinding, SlotId};
pub use store::SchemaCache;
pub use task::TaskInfo;
