use crate::model::{InputSlot, Node, NodeFlags, OutputSlot, Uuid, link_key};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A serializable representation of an input row.
///
/// Links are referenced by their stable numeric key (see `model::link_key`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedInput {
    pub name: String,
    pub slot_type: String,
    pub link: Option<u64>,
    /// Set by extensions on rows they create themselves, naming what the row
    /// stands for. Stripped before the workflow leaves the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pseudo: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedOutput {
    pub name: String,
    pub slot_type: String,
    pub links: Vec<u64>,
}

/// A serializable representation of a Node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    pub uuid: Uuid,
    pub node_type: String,
    pub title: String,
    pub position: Vec2,
    pub size: Vec2,
    pub inputs: Vec<SavedInput>,
    pub outputs: Vec<SavedOutput>,
    /// Widget values in widget order.
    pub widgets_values: Vec<Value>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub flags: NodeFlags,
}

impl SavedNode {
    /// Captures what the host itself can see of a node.
    pub fn from_node(node: &Node) -> Self {
        Self {
            uuid: node.uuid,
            node_type: node.node_type.clone(),
            title: node.title.clone(),
            position: node.position,
            size: node.size,
            inputs: node.inputs.iter().map(SavedInput::from_slot).collect(),
            outputs: node.outputs.iter().map(SavedOutput::from_slot).collect(),
            widgets_values: node.widgets.iter().map(|w| w.value.clone()).collect(),
            properties: node.properties.clone(),
            flags: node.flags - NodeFlags::DIRTY - NodeFlags::SELECTED,
        }
    }
}

impl SavedInput {
    pub fn from_slot(slot: &InputSlot) -> Self {
        Self {
            name: slot.name.clone(),
            slot_type: slot.slot_type.clone(),
            link: slot.link.map(link_key),
            pseudo: None,
        }
    }
}

impl SavedOutput {
    pub fn from_slot(slot: &OutputSlot) -> Self {
        Self {
            name: slot.name.clone(),
            slot_type: slot.slot_type.clone(),
            links: slot.links.iter().copied().map(link_key).collect(),
        }
    }
}

/// A serializable representation of a Link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedLink {
    pub id: u64,
    pub origin: Uuid,
    pub origin_slot: usize,
    pub target: Uuid,
    pub target_slot: usize,
    pub link_type: String,
}

/// A serializable snapshot of the Graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedGraph {
    pub nodes: Vec<SavedNode>,
    pub links: Vec<SavedLink>,
}

impl SavedGraph {
    pub fn node(&self, uuid: &Uuid) -> Option<&SavedNode> {
        self.nodes.iter().find(|n| n.uuid == *uuid)
    }

    pub fn link(&self, id: u64) -> Option<&SavedLink> {
        self.links.iter().find(|l| l.id == id)
    }

    pub fn link_mut(&mut self, id: u64) -> Option<&mut SavedLink> {
        self.links.iter_mut().find(|l| l.id == id)
    }
}
