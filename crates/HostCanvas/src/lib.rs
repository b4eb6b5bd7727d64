//! # HostCanvas
//!
//! `host_canvas` is a headless, retained-mode node editor runtime.
//! It owns the graph state (nodes, slots, widgets, links), the node type registry
//! and the lifecycle hook pipeline that extensions plug into, while delegating
//! rendering to whatever front-end sits on top of it.
//!
//! ## Core Architecture
//! - **Model (`src/model.rs`)**: Stores the graph state in flat arenas (SlotMap).
//! - **Hooks (`src/hooks.rs`)**: Per-node lifecycle callbacks, chainable per node type.
//! - **Editor (`src/editor.rs`)**: The mutation API that drives the hooks.
//! - **Persistence (`src/persistence.rs`)**: Workflow snapshots with stable UUIDs.
//! - **Prompt (`src/prompt.rs`)**: The backend-bound execution payload.

pub mod config;
pub mod editor;
pub mod error;
pub mod hooks;
pub mod layout;
pub mod model;
pub mod persistence;
pub mod prompt;

// Re-exports for convenience
pub use config::HostConfig;
pub use editor::{Editor, HookFactory, NodeDefinition, SlotDef, WidgetDef};
pub use error::HostError;
pub use hooks::{ConnectionChange, InputLookup, NodeHooks, SlotKind};
pub use model::{GraphState, LinkId, Node, NodeId};
pub use persistence::{SavedGraph, SavedNode};
pub use prompt::{PromptInput, PromptNode, PromptPayload};
