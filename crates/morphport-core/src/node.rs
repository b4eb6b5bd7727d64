//! Host glue for one dynamic node instance.

use crate::components::{ControlRole, NodeDynamicState, NodeSession, Response, Ticket};
use crate::systems::{restore, sync};
use dashmap::DashMap;
use glam::Vec2;
use host_canvas::{ConnectionChange, HostConfig, InputLookup, Node, NodeHooks, SavedNode};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Registry type of the dynamic node.
pub const DYNAMIC_NODE_TYPE: &str = "DynamicTaskCreate";

/// Every dynamic node currently in the graph, by uuid.
pub type LiveNodes = Arc<DashMap<Uuid, DynamicNode>>;

/// Shared handle to a node's session. The host's hooks and the async result
/// path both go through it.
#[derive(Clone, Debug)]
pub struct DynamicNode {
    pub uuid: Uuid,
    session: Arc<Mutex<NodeSession>>,
}

impl DynamicNode {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            session: Arc::new(Mutex::new(NodeSession::default())),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, NodeSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> NodeDynamicState {
        self.lock().state.clone()
    }

    pub fn take_tickets(&self) -> Vec<Ticket> {
        self.lock().take_tickets()
    }

    /// Applies a fetched result and re-renders the node.
    pub fn complete(&self, node: &mut Node, ticket: &Ticket, response: Response) -> bool {
        let mut session = self.lock();
        let applied = sync::apply_response(&mut session, ticket, response);
        if applied {
            sync::apply(&session, node);
        }
        applied
    }

    pub fn reconcile(&self, node: &mut Node) -> bool {
        sync::reconcile(&mut self.lock(), node)
    }
}

/// The [`NodeHooks`] registered for [`DYNAMIC_NODE_TYPE`].
pub struct DynamicHooks {
    node: DynamicNode,
    live: LiveNodes,
    config: HostConfig,
}

impl DynamicHooks {
    pub fn new(node: DynamicNode, live: LiveNodes, config: HostConfig) -> Self {
        Self { node, live, config }
    }
}

impl NodeHooks for DynamicHooks {
    fn on_created(&mut self, node: &mut Node) {
        self.live.insert(node.uuid, self.node.clone());
        sync::apply(&self.node.lock(), node);
    }

    fn on_configure(&mut self, node: &mut Node, saved: &SavedNode) {
        restore::configure(&mut self.node.lock(), node, saved);
    }

    fn on_added(&mut self, node: &mut Node) {
        let mut session = self.node.lock();
        restore::init_fresh(&mut session);
        sync::apply(&session, node);
    }

    fn on_connections_change(&mut self, node: &mut Node, change: &ConnectionChange) {
        let mut session = self.node.lock();
        if sync::mirror_connection(&mut session, &node.inputs, change) {
            sync::apply(&session, node);
        }
    }

    fn on_widget_changed(&mut self, node: &mut Node, widget: &str, value: &Value) {
        let mut session = self.node.lock();
        let Some(role) = session.controls.role_of(widget).cloned() else {
            return;
        };
        session.controls.set_value(&role, value.clone());
        match role {
            ControlRole::CategorySelector => {
                sync::select_category(&mut session, value);
            }
            ControlRole::ModelSelector => {
                sync::select_model(&mut session, value);
            }
            ControlRole::Parameter { name } => sync::set_parameter_value(&mut session, &name, value),
        }
        sync::apply(&session, node);
    }

    fn compute_size(&self, node: &Node, current: Vec2) -> Vec2 {
        sync::measure(&self.node.lock(), node, &self.config, current)
    }

    fn lookup_input(&self, _node: &Node, name: &str) -> Option<InputLookup> {
        sync::lookup(&self.node.lock(), name)
    }

    fn on_serialize(&mut self, _node: &Node, saved: &mut SavedNode) {
        sync::serialize(&self.node.lock(), saved);
    }

    fn on_removed(&mut self, node: &Node) {
        self.live.remove(&node.uuid);
        tracing::debug!(node_id = %node.uuid, "Dynamic node removed");
    }
}
