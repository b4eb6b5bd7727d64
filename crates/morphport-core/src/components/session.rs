use super::{ControlTable, HiddenValueStore, NodeDynamicState, PortTable, Selection};
use crate::service::{Category, ModelRef};
use morphport_inspector::InspectorState;
use serde_json::Value;

static UNSET: Value = Value::Null;

/// A schema service read a node is waiting on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Categories,
    Models { category: String },
    Schema { model_id: String },
    /// Display name of an already selected model.
    ModelName { category: String, model_id: String },
}

/// A request plus the selection it was issued for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub request: Request,
    pub issued_for: Selection,
}

/// What came back for a [`Ticket`].
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Categories(Vec<Category>),
    Models(Vec<ModelRef>),
    Schema(Option<Value>),
    ModelName(Option<String>),
}

/// Where a node is in its restore/fresh initialization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    /// Created; neither path has run yet.
    #[default]
    Pending,
    Fresh,
    Restored,
}

/// Everything one dynamic node instance owns.
#[derive(Clone, Debug, Default)]
pub struct NodeSession {
    pub state: NodeDynamicState,
    pub ports: PortTable,
    pub controls: ControlTable,
    pub hidden: HiddenValueStore,
    /// Required-value tracking for the current parameter controls.
    pub inspector: InspectorState,
    pub categories: Vec<Category>,
    pub models: Vec<ModelRef>,
    pub phase: Phase,
    // Each request with the selection it was made for.
    pending: Vec<(Request, Selection)>,
}

impl NodeSession {
    pub fn is_initialized(&self) -> bool {
        self.phase != Phase::Pending
    }

    /// Queues a request, stamped with the selection it is made for. A request
    /// already queued for the same selection is not queued again.
    pub fn request(&mut self, request: Request) {
        let issued_for = self.state.selection();
        if !self
            .pending
            .iter()
            .any(|(queued, stamp)| *queued == request && *stamp == issued_for)
        {
            self.pending.push((request, issued_for));
        }
    }

    /// Hands out queued requests with their stamps.
    pub fn take_tickets(&mut self) -> Vec<Ticket> {
        self.pending
            .drain(..)
            .map(|(request, issued_for)| Ticket {
                request,
                issued_for,
            })
            .collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether a ticket's result still applies to the current selection.
    ///
    /// The category list never goes stale; model lists only depend on the
    /// category.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        let now = self.state.selection();
        match &ticket.request {
            Request::Categories => true,
            Request::Models { category } => now.category.as_deref() == Some(category.as_str()),
            Request::Schema { model_id } => {
                now.model_id.as_deref() == Some(model_id.as_str()) && ticket.issued_for == now
            }
            Request::ModelName { .. } => ticket.issued_for == now,
        }
    }

    /// Recomputes the hidden fields from the current state and wiring, and
    /// re-checks required parameters. A wired parameter counts as supplied.
    pub fn refresh_hidden(&mut self) {
        let ports = &self.ports;
        let values = &self.state.values;
        self.hidden = HiddenValueStore::compute(&self.state, |name| ports.is_wired(name));
        self.inspector.validate(|name| {
            if ports.is_wired(name) {
                None
            } else {
                Some(values.get(name).unwrap_or(&UNSET))
            }
        });
    }

    /// Required parameters that have neither a value nor a wire.
    pub fn missing_required(&self) -> Vec<&str> {
        let mut missing: Vec<&str> = self.inspector.errors.keys().map(String::as_str).collect();
        missing.sort_unstable();
        missing
    }
}
