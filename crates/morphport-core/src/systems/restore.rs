//! # Cache/Restore Controller
//!
//! Decides, once per node instance, whether the node starts fresh or is
//! restored from a saved snapshot, and brings the session into that state.

use crate::components::{
    CATEGORY_WIDGET, ControlRole, DYNAMIC_STATE_KEY, DynamicStateBlob, HiddenValueStore,
    MODEL_CACHE_KEY, ModelCacheBlob, NodeDynamicState, NodeSession, Phase, Request, read_blob,
};
use crate::pool::{ParameterMapping, PlaceholderPool};
use crate::systems::sync;
use host_canvas::{LinkId, Node, SavedNode};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Where a restored state was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreSource {
    DynamicState,
    ModelCache,
    /// The three backend-facing widget values of a workflow saved without
    /// either blob.
    StaticFields,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RestorePlan {
    Fresh,
    Restore {
        state: NodeDynamicState,
        source: RestoreSource,
    },
}

/// Picks the snapshot a saved node should be restored from.
///
/// `dynamicState` wins over `modelCache`; a malformed or empty blob falls
/// through to the next candidate. Nothing usable means a fresh start.
pub fn plan(saved: &SavedNode) -> RestorePlan {
    match read_blob::<DynamicStateBlob>(&saved.properties, DYNAMIC_STATE_KEY) {
        Ok(Some(blob)) if is_usable(&blob) => {
            return RestorePlan::Restore {
                state: NodeDynamicState::from_blob(blob),
                source: RestoreSource::DynamicState,
            };
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(node_id = %saved.uuid, error = %e, "Ignoring saved dynamic state"),
    }

    match read_blob::<ModelCacheBlob>(&saved.properties, MODEL_CACHE_KEY) {
        Ok(Some(cached)) if is_usable(&cached.state) => {
            tracing::debug!(node_id = %saved.uuid, taken_at = %cached.timestamp, "Restoring from model cache");
            return RestorePlan::Restore {
                state: NodeDynamicState::from_blob(cached.state),
                source: RestoreSource::ModelCache,
            };
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(node_id = %saved.uuid, error = %e, "Ignoring saved model cache"),
    }

    match from_static_fields(&saved.widgets_values) {
        Some(state) => RestorePlan::Restore {
            state,
            source: RestoreSource::StaticFields,
        },
        None => RestorePlan::Fresh,
    }
}

fn is_usable(blob: &DynamicStateBlob) -> bool {
    blob.category.as_deref().is_some_and(|c| !c.is_empty())
        || blob.model_id.as_deref().is_some_and(|m| !m.is_empty())
}

/// Rebuilds a parameter-less state from `model_id`, `request_json` and
/// `param_map`. The schema has to be fetched again.
fn from_static_fields(values: &[Value]) -> Option<NodeDynamicState> {
    let hidden = HiddenValueStore::from_widget_values(values)?;
    if hidden.model_id.trim().is_empty() {
        return None;
    }
    let Ok(Value::Object(request)) = serde_json::from_str::<Value>(&hidden.request_json) else {
        return None;
    };
    let mapping = ParameterMapping::parse_lenient(&hidden.param_map);

    Some(NodeDynamicState {
        model_id: Some(hidden.model_id),
        values: request.into_iter().collect::<BTreeMap<_, _>>(),
        pool: PlaceholderPool::from_mapping(&mapping),
        ..Default::default()
    })
}

/// Runs from the host's configure hook, after it restored the saved rows and
/// links onto `node`.
pub fn configure(session: &mut NodeSession, node: &mut Node, saved: &SavedNode) {
    if session.is_initialized() {
        tracing::debug!(node_id = %node.uuid, "Node already initialized; ignoring configure");
        return;
    }

    // Saved pseudo rows are unknown to a fresh port table: their links come
    // back keyed by parameter name.
    let carried = session.ports.absorb_rendered(&node.inputs);

    match plan(saved) {
        RestorePlan::Fresh => init_fresh(session),
        RestorePlan::Restore { state, source } => {
            tracing::info!(
                node_id = %node.uuid,
                model_id = state.model_id.as_deref().unwrap_or_default(),
                ?source,
                "Restoring dynamic node"
            );
            restore(session, state, carried);
        }
    }
    sync::apply(session, node);
}

/// Empty selectors, no parameters. Asks for the category list.
pub fn init_fresh(session: &mut NodeSession) {
    if session.is_initialized() {
        return;
    }
    session.phase = Phase::Fresh;
    session
        .controls
        .set_value(&ControlRole::CategorySelector, Value::String(String::new()));
    session
        .controls
        .set_value(&ControlRole::ModelSelector, Value::String(String::new()));
    session.refresh_hidden();
    session.request(Request::Categories);
    tracing::debug!(widget = CATEGORY_WIDGET, "Initialized fresh dynamic node");
}

/// Brings the session to `state` without touching the network when the state
/// carries its parameter list.
pub fn restore(session: &mut NodeSession, state: NodeDynamicState, carried: HashMap<String, LinkId>) {
    session.state = state;
    session.phase = Phase::Restored;

    let category = session.state.category.clone().unwrap_or_default();
    let model_display = session
        .state
        .model_name
        .clone()
        .or_else(|| session.state.model_id.clone())
        .unwrap_or_default();
    session
        .controls
        .set_value(&ControlRole::CategorySelector, Value::String(category.clone()));
    session
        .controls
        .set_value(&ControlRole::ModelSelector, Value::String(model_display));

    // Selector option lists are never persisted.
    session.request(Request::Categories);
    if !category.is_empty() {
        session.request(Request::Models {
            category: category.clone(),
        });
        if let (Some(model_id), None) = (&session.state.model_id, &session.state.model_name) {
            session.request(Request::ModelName {
                category,
                model_id: model_id.clone(),
            });
        }
    }

    if !session.state.parameters.is_empty() {
        sync::rebuild(session, carried);
        return;
    }

    if let Some(model_id) = session.state.model_id.clone() {
        // Keep the saved wires attached to provisional ports until the schema
        // arrives and the real rebuild replaces them.
        let bindings: Vec<_> = session
            .state
            .mapping()
            .iter()
            .map(|(name, binding)| (name.clone(), binding.clone()))
            .collect();
        let mut carried = carried;
        for (name, binding) in bindings {
            session.ports.add_pseudo(
                &name,
                binding.placeholder,
                binding.backend_type.slot_type(),
                carried.remove(&name),
            );
        }
        session.ports.redirect_placeholder_links();
        session.request(Request::Schema { model_id });
    }
    session.refresh_hidden();
}
