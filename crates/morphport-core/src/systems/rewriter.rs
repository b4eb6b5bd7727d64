//! # Execution-Time Rewriter
//!
//! Dynamic nodes render pseudo-ports the backend has never heard of. Before a
//! workflow is persisted or submitted, both payloads are rewritten onto the
//! node's static contract: the twenty placeholder inputs plus the three hidden
//! fields.

use crate::components::{
    DYNAMIC_STATE_KEY, DynamicStateBlob, HIDDEN_FIELDS, HiddenValueStore, NodeDynamicState,
    PLACEHOLDER_TYPE, read_blob,
};
use crate::node::DYNAMIC_NODE_TYPE;
use crate::pool::{POOL_CAPACITY, SlotId};
use host_canvas::persistence::SavedInput;
use host_canvas::{PromptInput, PromptPayload, SavedGraph, SavedNode};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// The state embedded in a saved node, if it is usable.
pub fn embedded_state(saved: &SavedNode) -> Option<NodeDynamicState> {
    match read_blob::<DynamicStateBlob>(&saved.properties, DYNAMIC_STATE_KEY) {
        Ok(Some(blob)) => Some(NodeDynamicState::from_blob(blob)),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(node_id = %saved.uuid, error = %e, "Embedded state unreadable");
            None
        }
    }
}

/// Rewrites every dynamic node of a persisted workflow. Returns how many were
/// rewritten.
///
/// `fallback` supplies the live state of nodes whose saved form carries none.
#[tracing::instrument(skip_all, fields(nodes = graph.nodes.len()))]
pub fn rewrite_workflow(
    graph: &mut SavedGraph,
    fallback: impl Fn(Uuid) -> Option<NodeDynamicState>,
) -> usize {
    let mut rewritten = 0;
    let mut dropped: HashSet<u64> = HashSet::new();
    let mut retargeted: BTreeMap<u64, usize> = BTreeMap::new();

    for node in graph
        .nodes
        .iter_mut()
        .filter(|n| n.node_type == DYNAMIC_NODE_TYPE)
    {
        let Some(state) = embedded_state(node).or_else(|| fallback(node.uuid)) else {
            continue;
        };
        if !state.has_model() {
            continue;
        }

        let slot_links = route_rows(node, &state, &mut dropped);
        for (index, link) in slot_links.iter().enumerate() {
            if let Some(link) = link {
                retargeted.insert(*link, index);
            }
        }

        let wired: HashSet<SlotId> = SlotId::all()
            .filter(|slot| slot_links[slot.index()].is_some())
            .collect();
        let hidden = HiddenValueStore::compute(&state, |name| {
            state
                .pool
                .binding(name)
                .is_some_and(|b| wired.contains(&b.placeholder))
        });

        node.inputs = SlotId::all()
            .map(|slot| SavedInput {
                name: slot.name(),
                slot_type: PLACEHOLDER_TYPE.to_string(),
                link: slot_links[slot.index()],
                pseudo: None,
            })
            .collect();
        node.widgets_values = hidden.widget_values();
        rewritten += 1;
    }

    for link in &mut graph.links {
        if let Some(&index) = retargeted.get(&link.id) {
            link.target_slot = index;
        }
    }
    if !dropped.is_empty() {
        graph.links.retain(|l| !dropped.contains(&l.id));
        for output in graph.nodes.iter_mut().flat_map(|n| n.outputs.iter_mut()) {
            output.links.retain(|l| !dropped.contains(l));
        }
        tracing::warn!(count = dropped.len(), "Dropped connections with no placeholder");
    }
    rewritten
}

/// Decides which link each placeholder carries. Links that cannot be routed
/// are collected into `dropped`.
fn route_rows(
    node: &SavedNode,
    state: &NodeDynamicState,
    dropped: &mut HashSet<u64>,
) -> [Option<u64>; POOL_CAPACITY] {
    let mut slots = [None; POOL_CAPACITY];
    let mut unrouted = Vec::new();

    // Rows already naming a placeholder pass through.
    for row in &node.inputs {
        match SlotId::parse(&row.name) {
            Some(slot) if row.pseudo.is_none() => {
                if row.link.is_some() {
                    slots[slot.index()] = row.link;
                }
            }
            _ => unrouted.push(row),
        }
    }

    for row in unrouted {
        let Some(link) = row.link else {
            continue;
        };
        let parameter = row.pseudo.as_deref().unwrap_or(&row.name);
        match state.pool.binding(parameter) {
            Some(binding) => {
                let target = &mut slots[binding.placeholder.index()];
                match *target {
                    None => *target = Some(link),
                    Some(existing) if existing == link => {}
                    Some(existing) => {
                        tracing::warn!(
                            node_id = %node.uuid,
                            parameter,
                            slot = %binding.placeholder,
                            kept = existing,
                            "Placeholder already connected"
                        );
                        dropped.insert(link);
                    }
                }
            }
            None => {
                tracing::warn!(node_id = %node.uuid, parameter, "No placeholder for connection");
                dropped.insert(link);
            }
        }
    }
    slots
}

/// Rewrites every dynamic node of an execution payload. Returns how many were
/// rewritten.
///
/// State comes from the matching node of `workflow` when given, otherwise from
/// `fallback`.
#[tracing::instrument(skip_all, fields(nodes = payload.nodes.len()))]
pub fn rewrite_prompt(
    payload: &mut PromptPayload,
    workflow: Option<&SavedGraph>,
    fallback: impl Fn(Uuid) -> Option<NodeDynamicState>,
) -> usize {
    let mut rewritten = 0;
    for (key, node) in payload
        .nodes
        .iter_mut()
        .filter(|(_, n)| n.class_type == DYNAMIC_NODE_TYPE)
    {
        let Ok(uuid) = Uuid::parse_str(key) else {
            tracing::warn!(node_id = %key, "Dynamic node key is not a uuid");
            continue;
        };
        let embedded = workflow
            .and_then(|w| w.node(&uuid))
            .and_then(embedded_state);
        let Some(state) = embedded.or_else(|| fallback(uuid)) else {
            continue;
        };
        if !state.has_model() {
            continue;
        }

        let mut inputs = BTreeMap::new();
        for (name, input) in std::mem::take(&mut node.inputs) {
            let PromptInput::Link(..) = input else {
                continue;
            };
            let slot = SlotId::parse(&name).or_else(|| state.pool.binding(&name).map(|b| b.placeholder));
            match slot {
                Some(slot) => {
                    inputs.entry(slot.name()).or_insert(input);
                }
                None => tracing::warn!(node_id = %key, input = %name, "Dropping connection with no placeholder"),
            }
        }

        let hidden = HiddenValueStore::compute(&state, |name| {
            state
                .pool
                .binding(name)
                .is_some_and(|b| inputs.contains_key(&b.placeholder.name()))
        });
        for (field, value) in HIDDEN_FIELDS.iter().zip(hidden.widget_values()) {
            inputs.insert(field.to_string(), PromptInput::Value(value));
        }

        node.inputs = inputs;
        node.meta = None;
        rewritten += 1;
    }
    rewritten
}
