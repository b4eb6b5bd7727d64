//! # Node Lifecycle Hooks
//!
//! Extensions customise a node type by implementing `NodeHooks`. The editor calls
//! the hooks of a node at fixed points of its lifecycle; every method has a no-op
//! default so an extension only overrides what it needs.
//!
//! Registering a second extension for the same node type never replaces the first
//! one: the two are composed with [`chain`], which runs the pre-existing hook
//! before the new one.

use crate::model::{LinkId, Node};
use crate::persistence::SavedNode;
use glam::Vec2;
use serde_json::Value;

/// Which side of a node a connection change happened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Input,
    Output,
}

/// Notification of a link being attached to or detached from a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionChange {
    pub kind: SlotKind,
    /// Index into the node's rendered slot list.
    pub index: usize,
    pub connected: bool,
    pub link: Option<LinkId>,
}

/// Result of resolving an input by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputLookup {
    Linked(LinkId),
    Unlinked,
}

/// Lifecycle callbacks for a single node instance.
pub trait NodeHooks: Send {
    /// The node was instantiated from its type definition.
    fn on_created(&mut self, _node: &mut Node) {}

    /// The node was restored from a saved workflow. Runs after the saved
    /// inputs, links, widget values and properties were applied.
    fn on_configure(&mut self, _node: &mut Node, _saved: &SavedNode) {}

    /// The node joined the graph. Runs once per instance, after `on_configure`
    /// when loading.
    fn on_added(&mut self, _node: &mut Node) {}

    fn on_connections_change(&mut self, _node: &mut Node, _change: &ConnectionChange) {}

    fn on_widget_changed(&mut self, _node: &mut Node, _widget: &str, _value: &Value) {}

    /// Returns the node size given the size computed so far.
    fn compute_size(&self, _node: &Node, current: Vec2) -> Vec2 {
        current
    }

    /// Resolves an input by name, including inputs that are not rendered.
    /// `None` defers to the host's own lookup.
    fn lookup_input(&self, _node: &Node, _name: &str) -> Option<InputLookup> {
        None
    }

    fn on_serialize(&mut self, _node: &Node, _saved: &mut SavedNode) {}

    fn on_removed(&mut self, _node: &Node) {}
}

/// Two hooks composed so the previous implementation always runs first.
pub struct HookChain {
    previous: Box<dyn NodeHooks>,
    next: Box<dyn NodeHooks>,
}

/// Composes `next` after `previous`.
pub fn chain(previous: Box<dyn NodeHooks>, next: Box<dyn NodeHooks>) -> Box<dyn NodeHooks> {
    Box::new(HookChain { previous, next })
}

impl NodeHooks for HookChain {
    fn on_created(&mut self, node: &mut Node) {
        self.previous.on_created(node);
        self.next.on_created(node);
    }

    fn on_configure(&mut self, node: &mut Node, saved: &SavedNode) {
        self.previous.on_configure(node, saved);
        self.next.on_configure(node, saved);
    }

    fn on_added(&mut self, node: &mut Node) {
        self.previous.on_added(node);
        self.next.on_added(node);
    }

    fn on_connections_change(&mut self, node: &mut Node, change: &ConnectionChange) {
        self.previous.on_connections_change(node, change);
        self.next.on_connections_change(node, change);
    }

    fn on_widget_changed(&mut self, node: &mut Node, widget: &str, value: &Value) {
        self.previous.on_widget_changed(node, widget, value);
        self.next.on_widget_changed(node, widget, value);
    }

    fn compute_size(&self, node: &Node, current: Vec2) -> Vec2 {
        let size = self.previous.compute_size(node, current);
        self.next.compute_size(node, size)
    }

    fn lookup_input(&self, node: &Node, name: &str) -> Option<InputLookup> {
        // The newer extension knows about the inputs it hides.
        self.next
            .lookup_input(node, name)
            .or_else(|| self.previous.lookup_input(node, name))
    }

    fn on_serialize(&mut self, node: &Node, saved: &mut SavedNode) {
        self.previous.on_serialize(node, saved);
        self.next.on_serialize(node, saved);
    }

    fn on_removed(&mut self, node: &Node) {
        self.previous.on_removed(node);
        self.next.on_removed(node);
    }
}
