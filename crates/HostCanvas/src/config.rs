//! # Configuration
//!
//! Layout metrics used by the host when measuring nodes.

use serde::{Deserialize, Serialize};

/// Layout parameters for node measurement.
///
/// All values are in world units. Extensions that own their own slot or widget
/// lists read the same metrics so their `compute_size` agrees with the host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HostConfig {
    /// Minimum width of a node. Default: 240.0.
    pub node_width: f32,
    /// Height of the title bar. Default: 30.0.
    pub title_height: f32,
    /// Vertical space per input/output row. Default: 20.0.
    pub slot_height: f32,
    /// Vertical space per widget row. Default: 24.0.
    pub widget_height: f32,
    /// Bottom padding. Default: 8.0.
    pub padding: f32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            node_width: 240.0,
            title_height: 30.0,
            slot_height: 20.0,
            widget_height: 24.0,
            padding: 8.0,
        }
    }
}
