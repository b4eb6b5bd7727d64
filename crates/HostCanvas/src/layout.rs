use crate::config::HostConfig;
use crate::model::{Node, NodeFlags};
use glam::Vec2;

/// Measures a node from its currently rendered slot and widget lists.
///
/// Inputs and outputs share rows; widgets stack below them.
/// A collapsed node only keeps its title bar.
pub fn measure(node: &Node, config: &HostConfig) -> Vec2 {
    if node.flags.contains(NodeFlags::COLLAPSED) {
        return Vec2::new(config.node_width, config.title_height);
    }

    let rows = node.inputs.len().max(node.outputs.len()) as f32;
    let height = config.title_height
        + rows * config.slot_height
        + node.widgets.len() as f32 * config.widget_height
        + config.padding;

    Vec2::new(config.node_width.max(node.size.x), height)
}
