//! # Core Data Models
//!
//! This module defines the host's graph data model.
//! It uses `SlotMap` for efficient, safe, and stable entity storage without pointers.
//!
//! Links address their target by input index, the same way a rendered node
//! addresses its input rows. Because extensions may replace a node's rendered
//! input list, `GraphState::sync_links` re-derives those indices from the
//! inputs that actually carry each link.

use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slotmap::{Key, SlotMap, new_key_type};
use std::collections::HashMap;

pub use uuid::Uuid;

new_key_type! {
    /// Unique identifier for a Node.
    pub struct NodeId;
    /// Unique identifier for a Link.
    pub struct LinkId;
}

/// Stable numeric form of a link key, used in saved workflows.
pub fn link_key(id: LinkId) -> u64 {
    id.data().as_ffi()
}

bitflags! {
    /// Bitflags representing various boolean states of a Node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// The node cannot be moved or deleted.
        const LOCKED = 1 << 0;
        /// Only the title bar is rendered.
        const COLLAPSED = 1 << 1;
        /// The node is currently selected by the user.
        const SELECTED = 1 << 2;
        /// Slot or widget lists changed; size must be recomputed.
        const DIRTY = 1 << 3;
    }
}

// Manual Serialize/Deserialize implementation for bitflags to be friendly
impl Serialize for NodeFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for NodeFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

/// An input row on a node. Accepts at most one link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputSlot {
    pub name: String,
    pub slot_type: String,
    pub link: Option<LinkId>,
}

impl InputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            link: None,
        }
    }
}

/// An output row on a node. Fans out to any number of links.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSlot {
    pub name: String,
    pub slot_type: String,
    pub links: Vec<LinkId>,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
            links: Vec::new(),
        }
    }
}

/// The rendering contract for an interactive control.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WidgetKind {
    /// Free-form text box.
    Text { multiline: bool },
    /// Boolean toggle.
    Toggle,
    /// Dropdown over a fixed list of values.
    Combo { values: Vec<Value> },
    /// Numeric spinner.
    Number {
        min: Option<f64>,
        max: Option<f64>,
        step: f64,
        precision: u8,
    },
}

/// An interactive control rendered inside a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub name: String,
    pub label: String,
    pub kind: WidgetKind,
    pub value: Value,
    #[serde(default)]
    pub tooltip: Option<String>,
}

impl Widget {
    pub fn new(name: impl Into<String>, kind: WidgetKind, value: Value) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            kind,
            value,
            tooltip: None,
        }
    }
}

/// A Node in the graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    /// Self-reference ID.
    pub id: NodeId,
    /// Stable UUID for persistence and execution payloads.
    pub uuid: Uuid,
    /// Registry type string.
    pub node_type: String,
    pub title: String,
    /// World-space position of the top-left corner.
    pub position: Vec2,
    /// Size of the node layout.
    pub size: Vec2,
    /// The rendered input rows.
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<OutputSlot>,
    /// The rendered widgets.
    pub widgets: Vec<Widget>,
    /// Free-form persisted configuration.
    pub properties: Map<String, Value>,
    pub flags: NodeFlags,
}

impl Node {
    pub fn new(node_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: NodeId::default(),
            uuid: Uuid::new_v4(),
            node_type: node_type.into(),
            title: title.into(),
            position: Vec2::ZERO,
            size: Vec2::ZERO,
            inputs: Vec::new(),
            outputs: Vec::new(),
            widgets: Vec::new(),
            properties: Map::new(),
            flags: NodeFlags::default(),
        }
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|i| i.name == name)
    }

    pub fn widget(&self, name: &str) -> Option<&Widget> {
        self.widgets.iter().find(|w| w.name == name)
    }

    pub fn widget_mut(&mut self, name: &str) -> Option<&mut Widget> {
        self.widgets.iter_mut().find(|w| w.name == name)
    }
}

/// A Link from an output slot to an input slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub origin: NodeId,
    pub origin_slot: usize,
    pub target: NodeId,
    pub target_slot: usize,
    pub link_type: String,
}

/// The entire state of the Graph.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphState {
    /// Arena for Nodes.
    pub nodes: SlotMap<NodeId, Node>,
    /// Arena for Links.
    pub links: SlotMap<LinkId, Link>,
    /// Index for O(1) UUID to NodeId lookup.
    #[serde(default, skip)]
    pub uuid_index: HashMap<Uuid, NodeId>,
}

impl GraphState {
    /// Inserts a node and updates the UUID index.
    pub fn insert_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.insert_with_key(|key| Node { id: key, ..node });
        let uuid = self.nodes[id].uuid;
        self.uuid_index.insert(uuid, id);
        id
    }

    /// Removes a node, every link touching it, and updates the UUID index.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let touching: Vec<LinkId> = self
            .links
            .iter()
            .filter(|(_, l)| l.origin == id || l.target == id)
            .map(|(lid, _)| lid)
            .collect();
        for lid in touching {
            self.remove_link(lid);
        }

        let node = self.nodes.remove(id)?;
        self.uuid_index.remove(&node.uuid);
        Some(node)
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<NodeId> {
        self.uuid_index.get(uuid).copied()
    }

    /// Removes a link and detaches it from both of its endpoints.
    pub fn remove_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(id)?;
        if let Some(origin) = self.nodes.get_mut(link.origin)
            && let Some(out) = origin.outputs.get_mut(link.origin_slot)
        {
            out.links.retain(|l| *l != id);
        }
        if let Some(target) = self.nodes.get_mut(link.target) {
            for input in target.inputs.iter_mut().filter(|i| i.link == Some(id)) {
                input.link = None;
            }
        }
        Some(link)
    }

    /// Re-derives `target_slot` for every link carried by this node's inputs and
    /// drops links targeting the node that no rendered input carries anymore.
    ///
    /// Returns the number of dropped links.
    pub fn sync_links(&mut self, node_id: NodeId) -> usize {
        let Some(node) = self.nodes.get(node_id) else {
            return 0;
        };

        let carried: HashMap<LinkId, usize> = node
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(idx, input)| input.link.map(|l| (l, idx)))
            .collect();

        let mut orphaned = Vec::new();
        for (lid, link) in self.links.iter_mut() {
            if link.target != node_id {
                continue;
            }
            match carried.get(&lid) {
                Some(&idx) => link.target_slot = idx,
                None => orphaned.push(lid),
            }
        }

        for lid in &orphaned {
            tracing::debug!(link = link_key(*lid), "Dropping link no input carries");
            self.remove_link(*lid);
        }
        orphaned.len()
    }
}
