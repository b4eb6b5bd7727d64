//! # Dynamic Node Extension
//!
//! Registers the dynamic node type with a host [`Editor`] and drives the
//! parts of the node's life the host does not: schema service fetches, the
//! consistency timer, and the rewrite of captured workflows and payloads.

use crate::components::{HIDDEN_FIELDS, PLACEHOLDER_TYPE, Request, Response, Ticket};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::node::{DYNAMIC_NODE_TYPE, DynamicHooks, DynamicNode, LiveNodes};
use crate::pool::SlotId;
use crate::store::SchemaCache;
use crate::systems::consistency::{ConsistencyTimer, consistency_check};
use crate::systems::rewriter::{rewrite_prompt, rewrite_workflow};
use host_canvas::model::WidgetKind;
use host_canvas::{
    Editor, Node, NodeDefinition, NodeHooks, NodeId, PromptPayload, SavedGraph, SlotDef, WidgetDef,
};
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Output slot type of the dynamic node.
pub const TASK_INFO_TYPE: &str = "TASK_INFO";

/// Upper bound on fetch rounds per [`DynamicNodeExtension::settle`]. A result
/// can queue follow-up requests (a restored category asks for its models).
const MAX_SETTLE_ROUNDS: usize = 4;

pub struct DynamicNodeExtension {
    cache: SchemaCache,
    live: LiveNodes,
    timer: Mutex<ConsistencyTimer>,
}

impl DynamicNodeExtension {
    pub fn new(cache: SchemaCache, config: &EngineConfig) -> Self {
        Self {
            cache,
            live: LiveNodes::default(),
            timer: Mutex::new(ConsistencyTimer::new(config.consistency_interval)),
        }
    }

    /// The static contract the backend declares for the node.
    pub fn definition() -> NodeDefinition {
        NodeDefinition {
            node_type: DYNAMIC_NODE_TYPE.to_string(),
            title: "Dynamic Task Create".to_string(),
            inputs: SlotId::all()
                .map(|slot| SlotDef::new(slot.name(), PLACEHOLDER_TYPE))
                .collect(),
            outputs: vec![SlotDef::new("task_info", TASK_INFO_TYPE)],
            widgets: HIDDEN_FIELDS
                .iter()
                .map(|name| WidgetDef {
                    name: name.to_string(),
                    kind: WidgetKind::Text { multiline: false },
                    default: Value::String(String::new()),
                })
                .collect(),
        }
    }

    /// Declares the node type and hooks every instance of it.
    pub fn register(&self, editor: &mut Editor) {
        editor.register_type(Self::definition());
        let live = self.live.clone();
        let config = editor.config.clone();
        editor.register_extension(
            DYNAMIC_NODE_TYPE,
            Box::new(move |node: &Node| -> Box<dyn NodeHooks> {
                Box::new(DynamicHooks::new(
                    DynamicNode::new(node.uuid),
                    live.clone(),
                    config.clone(),
                ))
            }),
        );
        tracing::info!(node_type = DYNAMIC_NODE_TYPE, "Registered dynamic node extension");
    }

    /// Adds a dynamic node to the graph and returns its handle.
    pub fn add_node(&self, editor: &mut Editor) -> Result<(NodeId, DynamicNode), EngineError> {
        let id = editor.add_node(DYNAMIC_NODE_TYPE)?;
        let uuid = editor.graph.nodes[id].uuid;
        let handle = self.node(&uuid).ok_or(EngineError::UnknownNode(uuid))?;
        Ok((id, handle))
    }

    pub fn live(&self) -> &LiveNodes {
        &self.live
    }

    pub fn node(&self, uuid: &Uuid) -> Option<DynamicNode> {
        self.live.get(uuid).map(|entry| entry.value().clone())
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, request: &Request) -> Response {
        match request {
            Request::Categories => Response::Categories(self.cache.categories().await),
            Request::Models { category } => Response::Models(self.cache.models(category).await),
            Request::Schema { model_id } => Response::Schema(self.cache.model_schema(model_id).await),
            Request::ModelName { category, model_id } => {
                Response::ModelName(self.cache.model_name(category, model_id).await)
            }
        }
    }

    /// Delivers a fetched result to a node and lets the host settle it.
    pub fn complete(
        &self,
        editor: &mut Editor,
        uuid: Uuid,
        ticket: &Ticket,
        response: Response,
    ) -> Result<bool, EngineError> {
        let handle = self.node(&uuid).ok_or(EngineError::UnknownNode(uuid))?;
        let id = editor
            .graph
            .find_by_uuid(&uuid)
            .ok_or(EngineError::UnknownNode(uuid))?;
        Ok(editor
            .with_node_mut(id, |node| handle.complete(node, ticket, response))
            .unwrap_or(false))
    }

    /// Serves every queued request of every live node until none are left.
    /// Returns how many results were applied.
    #[tracing::instrument(skip_all)]
    pub async fn settle(&self, editor: &mut Editor) -> usize {
        let mut applied = 0;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let batch: Vec<(Uuid, Ticket)> = self
                .live
                .iter()
                .flat_map(|entry| {
                    let uuid = *entry.key();
                    entry
                        .value()
                        .take_tickets()
                        .into_iter()
                        .map(move |ticket| (uuid, ticket))
                })
                .collect();
            if batch.is_empty() {
                break;
            }

            for (uuid, ticket) in batch {
                let response = self.fetch(&ticket.request).await;
                match self.complete(editor, uuid, &ticket, response) {
                    Ok(true) => applied += 1,
                    Ok(false) => {}
                    Err(e) => tracing::debug!(node_id = %uuid, error = %e, "Result for a departed node"),
                }
            }
        }
        applied
    }

    /// Captures the workflow for persistence, rewritten onto the static
    /// contract.
    pub fn capture_workflow(&self, editor: &mut Editor) -> SavedGraph {
        let mut graph = editor.save();
        let rewritten = rewrite_workflow(&mut graph, |uuid| self.node(&uuid).map(|n| n.snapshot()));
        tracing::debug!(rewritten, "Captured workflow");
        graph
    }

    /// Captures the execution payload, rewritten onto the static contract.
    pub fn capture_prompt(&self, editor: &mut Editor) -> PromptPayload {
        for entry in self.live.iter() {
            let session = entry.value().lock();
            let missing = session.missing_required();
            if !missing.is_empty() {
                tracing::warn!(node_id = %entry.key(), ?missing, "Submitting without required parameters");
            }
        }
        let workflow = editor.save();
        let mut payload = editor.to_prompt();
        let rewritten = rewrite_prompt(&mut payload, Some(&workflow), |uuid| {
            self.node(&uuid).map(|n| n.snapshot())
        });
        tracing::debug!(rewritten, "Captured execution payload");
        payload
    }

    /// Runs the consistency check when its interval has elapsed.
    pub fn tick(&self, editor: &mut Editor) -> usize {
        let due = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .due();
        if due {
            consistency_check(editor, &self.live)
        } else {
            0
        }
    }
}

impl std::fmt::Debug for DynamicNodeExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicNodeExtension")
            .field("live", &self.live.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}
