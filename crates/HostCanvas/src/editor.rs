use crate::config::HostConfig;
use crate::error::HostError;
use crate::hooks::{ConnectionChange, InputLookup, NodeHooks, SlotKind, chain};
use crate::layout;
use crate::model::{
    GraphState, InputSlot, Link, LinkId, Node, NodeFlags, NodeId, OutputSlot, Uuid, Widget,
    WidgetKind, link_key,
};
use crate::persistence::{SavedGraph, SavedLink, SavedNode};
use crate::prompt::{PromptInput, PromptMeta, PromptNode, PromptPayload};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Builds the hooks for one node instance.
pub type HookFactory = Box<dyn Fn(&Node) -> Box<dyn NodeHooks> + Send + Sync>;

/// Static declaration of a slot.
#[derive(Clone, Debug)]
pub struct SlotDef {
    pub name: String,
    pub slot_type: String,
}

impl SlotDef {
    pub fn new(name: impl Into<String>, slot_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot_type: slot_type.into(),
        }
    }
}

/// Static declaration of a widget.
#[derive(Clone, Debug)]
pub struct WidgetDef {
    pub name: String,
    pub kind: WidgetKind,
    pub default: Value,
}

/// The static contract of a node type, as declared by the backend.
#[derive(Clone, Debug)]
pub struct NodeDefinition {
    pub node_type: String,
    pub title: String,
    pub inputs: Vec<SlotDef>,
    pub outputs: Vec<SlotDef>,
    pub widgets: Vec<WidgetDef>,
}

impl NodeDefinition {
    fn instantiate(&self, uuid: Uuid) -> Node {
        let mut node = Node::new(self.node_type.clone(), self.title.clone());
        node.uuid = uuid;
        node.inputs = self
            .inputs
            .iter()
            .map(|s| InputSlot::new(s.name.clone(), s.slot_type.clone()))
            .collect();
        node.outputs = self
            .outputs
            .iter()
            .map(|s| OutputSlot::new(s.name.clone(), s.slot_type.clone()))
            .collect();
        node.widgets = self
            .widgets
            .iter()
            .map(|w| Widget::new(w.name.clone(), w.kind.clone(), w.default.clone()))
            .collect();
        node
    }
}

/// The host editor runtime.
///
/// Owns the graph and the hooks of every node, and is the only place that
/// mutates slots and links. After every hook invocation the editor re-syncs the
/// node's links against its rendered inputs and re-measures it.
pub struct Editor {
    pub graph: GraphState,
    pub config: HostConfig,
    definitions: HashMap<String, NodeDefinition>,
    factories: HashMap<String, Vec<HookFactory>>,
    hooks: HashMap<NodeId, Box<dyn NodeHooks>>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Editor {
    pub fn new(config: HostConfig) -> Self {
        Self {
            graph: GraphState::default(),
            config,
            definitions: HashMap::new(),
            factories: HashMap::new(),
            hooks: HashMap::new(),
        }
    }

    pub fn register_type(&mut self, definition: NodeDefinition) {
        self.definitions
            .insert(definition.node_type.clone(), definition);
    }

    /// Registers hooks for a node type. Extensions registered earlier for the
    /// same type keep running, before this one.
    pub fn register_extension(&mut self, node_type: impl Into<String>, factory: HookFactory) {
        self.factories
            .entry(node_type.into())
            .or_default()
            .push(factory);
    }

    pub fn definition(&self, node_type: &str) -> Option<&NodeDefinition> {
        self.definitions.get(node_type)
    }

    fn build_hooks(&self, node: &Node) -> Option<Box<dyn NodeHooks>> {
        let factories = self.factories.get(&node.node_type)?;
        factories.iter().fold(None, |acc, factory| {
            let next = factory(node);
            Some(match acc {
                Some(previous) => chain(previous, next),
                None => next,
            })
        })
    }

    /// Creates the node and runs `on_created`. Does not run `on_added`.
    fn instantiate(&mut self, node_type: &str, uuid: Uuid) -> Result<NodeId, HostError> {
        let definition = self
            .definitions
            .get(node_type)
            .ok_or_else(|| HostError::UnknownNodeType(node_type.to_string()))?;
        let node = definition.instantiate(uuid);
        let hooks = self.build_hooks(&node);
        let id = self.graph.insert_node(node);

        if let Some(mut hooks) = hooks {
            hooks.on_created(&mut self.graph.nodes[id]);
            self.hooks.insert(id, hooks);
        }
        Ok(id)
    }

    /// Adds a fresh node of the given type to the graph.
    pub fn add_node(&mut self, node_type: &str) -> Result<NodeId, HostError> {
        let id = self.instantiate(node_type, Uuid::new_v4())?;
        self.with_hooks(id, |hooks, node| hooks.on_added(node));
        tracing::debug!(node_type, node = ?id, "Node added");
        Ok(id)
    }

    /// Runs `f` against a node's hooks and then settles the node.
    fn with_hooks(&mut self, id: NodeId, f: impl FnOnce(&mut dyn NodeHooks, &mut Node)) {
        if let (Some(hooks), Some(node)) = (self.hooks.get_mut(&id), self.graph.nodes.get_mut(id)) {
            f(hooks.as_mut(), node);
        }
        self.settle(id);
    }

    /// Applies an out-of-hook mutation to a node and settles it.
    ///
    /// Extensions use this to push state produced asynchronously.
    pub fn with_node_mut<R>(&mut self, id: NodeId, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        let result = f(self.graph.nodes.get_mut(id)?);
        self.settle(id);
        Some(result)
    }

    fn settle(&mut self, id: NodeId) {
        self.graph.sync_links(id);
        if let Some(node) = self.graph.nodes.get_mut(id) {
            node.flags.insert(NodeFlags::DIRTY);
        }
        self.layout(id);
    }

    /// Recomputes a node's size through its hooks.
    pub fn layout(&mut self, id: NodeId) -> Option<glam::Vec2> {
        let node = self.graph.nodes.get(id)?;
        let mut size = layout::measure(node, &self.config);
        if let Some(hooks) = self.hooks.get(&id) {
            size = hooks.compute_size(node, size);
        }
        let node = self.graph.nodes.get_mut(id)?;
        node.size = size;
        node.flags.remove(NodeFlags::DIRTY);
        Some(size)
    }

    /// Connects `origin`'s output to `target`'s rendered input, replacing any
    /// existing link on that input.
    pub fn connect(
        &mut self,
        origin: NodeId,
        origin_slot: usize,
        target: NodeId,
        target_slot: usize,
    ) -> Result<LinkId, HostError> {
        let origin_node = self.graph.nodes.get(origin).ok_or(HostError::NodeNotFound)?;
        let output = origin_node
            .outputs
            .get(origin_slot)
            .ok_or_else(|| HostError::SlotOutOfRange {
                node_type: origin_node.node_type.clone(),
                kind: "output",
                index: origin_slot,
            })?;
        let link_type = output.slot_type.clone();

        let target_node = self.graph.nodes.get(target).ok_or(HostError::NodeNotFound)?;
        let input = target_node
            .inputs
            .get(target_slot)
            .ok_or_else(|| HostError::SlotOutOfRange {
                node_type: target_node.node_type.clone(),
                kind: "input",
                index: target_slot,
            })?;

        if input.link.is_some() {
            self.disconnect_input(target, target_slot)?;
        }

        let id = self.graph.links.insert_with_key(|key| Link {
            id: key,
            origin,
            origin_slot,
            target,
            target_slot,
            link_type,
        });
        self.graph.nodes[origin].outputs[origin_slot].links.push(id);
        self.graph.nodes[target].inputs[target_slot].link = Some(id);

        let change = ConnectionChange {
            kind: SlotKind::Input,
            index: target_slot,
            connected: true,
            link: Some(id),
        };
        self.with_hooks(target, |hooks, node| hooks.on_connections_change(node, &change));

        let change = ConnectionChange {
            kind: SlotKind::Output,
            index: origin_slot,
            connected: true,
            link: Some(id),
        };
        self.with_hooks(origin, |hooks, node| hooks.on_connections_change(node, &change));

        Ok(id)
    }

    /// Detaches the link on a rendered input. Returns false if nothing was connected.
    pub fn disconnect_input(&mut self, target: NodeId, target_slot: usize) -> Result<bool, HostError> {
        let node = self.graph.nodes.get(target).ok_or(HostError::NodeNotFound)?;
        let input = node
            .inputs
            .get(target_slot)
            .ok_or_else(|| HostError::SlotOutOfRange {
                node_type: node.node_type.clone(),
                kind: "input",
                index: target_slot,
            })?;
        let Some(link_id) = input.link else {
            return Ok(false);
        };

        let link = self.graph.remove_link(link_id);

        let change = ConnectionChange {
            kind: SlotKind::Input,
            index: target_slot,
            connected: false,
            link: Some(link_id),
        };
        self.with_hooks(target, |hooks, node| hooks.on_connections_change(node, &change));

        if let Some(link) = link {
            let change = ConnectionChange {
                kind: SlotKind::Output,
                index: link.origin_slot,
                connected: false,
                link: Some(link_id),
            };
            self.with_hooks(link.origin, |hooks, node| {
                hooks.on_connections_change(node, &change)
            });
        }
        Ok(true)
    }

    /// Sets a rendered widget's value and notifies the node's hooks.
    pub fn set_widget_value(&mut self, id: NodeId, name: &str, value: Value) -> Result<(), HostError> {
        let node = self.graph.nodes.get_mut(id).ok_or(HostError::NodeNotFound)?;
        let node_type = node.node_type.clone();
        let widget = node
            .widget_mut(name)
            .ok_or_else(|| HostError::WidgetNotFound {
                node_type,
                name: name.to_string(),
            })?;
        widget.value = value.clone();

        self.with_hooks(id, |hooks, node| hooks.on_widget_changed(node, name, &value));
        Ok(())
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        if let (Some(mut hooks), Some(node)) = (self.hooks.remove(&id), self.graph.nodes.get(id)) {
            hooks.on_removed(node);
        }
        self.graph.remove_node(id)
    }

    /// Resolves an input by name, asking the node's hooks first so inputs the
    /// node does not render stay addressable.
    pub fn input_link(&self, id: NodeId, name: &str) -> Option<&Link> {
        let node = self.graph.nodes.get(id)?;
        let lookup = self
            .hooks
            .get(&id)
            .and_then(|hooks| hooks.lookup_input(node, name));

        let link_id = match lookup {
            Some(InputLookup::Linked(link)) => link,
            Some(InputLookup::Unlinked) => return None,
            None => node.inputs.iter().find(|i| i.name == name)?.link?,
        };
        self.graph.links.get(link_id)
    }

    /// Captures the workflow for persistence.
    pub fn save(&mut self) -> SavedGraph {
        let mut nodes = Vec::with_capacity(self.graph.nodes.len());
        for (id, node) in &self.graph.nodes {
            let mut saved = SavedNode::from_node(node);
            if let Some(hooks) = self.hooks.get_mut(&id) {
                hooks.on_serialize(node, &mut saved);
            }
            nodes.push(saved);
        }

        let links = self
            .graph
            .links
            .iter()
            .filter_map(|(id, link)| {
                Some(SavedLink {
                    id: link_key(id),
                    origin: self.graph.nodes.get(link.origin)?.uuid,
                    origin_slot: link.origin_slot,
                    target: self.graph.nodes.get(link.target)?.uuid,
                    target_slot: link.target_slot,
                    link_type: link.link_type.clone(),
                })
            })
            .collect();

        SavedGraph { nodes, links }
    }

    /// Loads a workflow, REPLACING the current graph.
    pub fn load(&mut self, saved: &SavedGraph) -> Result<(), HostError> {
        for id in self.graph.nodes.keys().collect::<Vec<_>>() {
            self.remove_node(id);
        }
        self.graph = GraphState::default();
        self.hooks.clear();

        // 1. Nodes, with their saved rows but no links yet
        let mut ids = Vec::with_capacity(saved.nodes.len());
        for saved_node in &saved.nodes {
            let id = self.instantiate(&saved_node.node_type, saved_node.uuid)?;
            let node = &mut self.graph.nodes[id];
            node.title = saved_node.title.clone();
            node.position = saved_node.position;
            node.size = saved_node.size;
            node.flags = saved_node.flags;
            node.properties = saved_node.properties.clone();
            node.inputs = saved_node
                .inputs
                .iter()
                .map(|i| InputSlot::new(i.name.clone(), i.slot_type.clone()))
                .collect();
            node.outputs = saved_node
                .outputs
                .iter()
                .map(|o| OutputSlot::new(o.name.clone(), o.slot_type.clone()))
                .collect();
            for (widget, value) in node.widgets.iter_mut().zip(&saved_node.widgets_values) {
                widget.value = value.clone();
            }
            ids.push(id);
        }

        // 2. Links
        let mut new_ids: HashMap<u64, LinkId> = HashMap::new();
        for saved_link in &saved.links {
            let (Some(origin), Some(target)) = (
                self.graph.find_by_uuid(&saved_link.origin),
                self.graph.find_by_uuid(&saved_link.target),
            ) else {
                tracing::warn!(link = saved_link.id, "Skipping link with a missing endpoint");
                continue;
            };
            if saved_link.origin_slot >= self.graph.nodes[origin].outputs.len() {
                continue;
            }
            let id = self.graph.links.insert_with_key(|key| Link {
                id: key,
                origin,
                origin_slot: saved_link.origin_slot,
                target,
                target_slot: saved_link.target_slot,
                link_type: saved_link.link_type.clone(),
            });
            self.graph.nodes[origin].outputs[saved_link.origin_slot]
                .links
                .push(id);
            new_ids.insert(saved_link.id, id);
        }

        for (id, saved_node) in ids.iter().zip(&saved.nodes) {
            let node = &mut self.graph.nodes[*id];
            for (input, saved_input) in node.inputs.iter_mut().zip(&saved_node.inputs) {
                input.link = saved_input.link.and_then(|l| new_ids.get(&l).copied());
            }
        }

        // 3. Hooks
        for (id, saved_node) in ids.iter().zip(&saved.nodes) {
            self.with_hooks(*id, |hooks, node| hooks.on_configure(node, saved_node));
        }
        for id in &ids {
            self.with_hooks(*id, |hooks, node| hooks.on_added(node));
        }

        tracing::info!(nodes = ids.len(), links = new_ids.len(), "Workflow loaded");
        Ok(())
    }

    /// Captures the execution payload from what each node renders.
    pub fn to_prompt(&self) -> PromptPayload {
        let mut nodes = BTreeMap::new();
        for node in self.graph.nodes.values() {
            let mut inputs = BTreeMap::new();
            for widget in &node.widgets {
                inputs.insert(widget.name.clone(), PromptInput::Value(widget.value.clone()));
            }
            for input in &node.inputs {
                let Some(link) = input.link.and_then(|l| self.graph.links.get(l)) else {
                    continue;
                };
                let Some(origin) = self.graph.nodes.get(link.origin) else {
                    continue;
                };
                inputs.insert(
                    input.name.clone(),
                    PromptInput::Link(origin.uuid.to_string(), link.origin_slot),
                );
            }

            nodes.insert(
                node.uuid.to_string(),
                PromptNode {
                    class_type: node.node_type.clone(),
                    inputs,
                    meta: Some(PromptMeta {
                        title: node.title.clone(),
                    }),
                },
            );
        }
        PromptPayload { nodes }
    }
}
