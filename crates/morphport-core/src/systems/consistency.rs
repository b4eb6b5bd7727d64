use crate::node::LiveNodes;
use host_canvas::{Editor, NodeId};
use std::time::{Duration, Instant};

/// Rate limit for the self-healing pass.
#[derive(Debug)]
pub struct ConsistencyTimer {
    last: Instant,
    interval: Duration,
}

impl ConsistencyTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            last: Instant::now(),
            interval,
        }
    }

    /// True at most once per interval.
    pub fn due(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            return true;
        }
        false
    }
}

/// Re-asserts the port visibility invariant on every live dynamic node.
/// Returns how many nodes needed repair.
#[tracing::instrument(skip_all, fields(nodes = live.len()))]
pub fn consistency_check(editor: &mut Editor, live: &LiveNodes) -> usize {
    // Never hold a map guard while the editor runs hooks.
    let targets: Vec<(NodeId, crate::node::DynamicNode)> = live
        .iter()
        .filter_map(|entry| {
            let id = editor.graph.find_by_uuid(entry.key())?;
            Some((id, entry.value().clone()))
        })
        .collect();

    let mut repaired = 0;
    for (id, handle) in targets {
        if editor
            .with_node_mut(id, |node| handle.reconcile(node))
            .unwrap_or(false)
        {
            repaired += 1;
        }
    }
    if repaired > 0 {
        tracing::info!(count = repaired, "Consistency check repaired nodes");
    }
    repaired
}
