use crate::pool::{POOL_CAPACITY, SlotId};
use host_canvas::LinkId;
use host_canvas::model::InputSlot;
use std::collections::HashMap;

/// Slot type of the statically declared placeholder inputs.
pub const PLACEHOLDER_TYPE: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortKind {
    /// A statically declared input. Never rendered.
    Placeholder { slot: SlotId },
    /// A rendered input standing for a schema parameter, paired with `slot`.
    Parameter { name: String, slot: SlotId },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    pub kind: PortKind,
    pub slot_type: String,
    pub link: Option<LinkId>,
}

impl Port {
    pub fn name(&self) -> String {
        match &self.kind {
            PortKind::Placeholder { slot } => slot.name(),
            PortKind::Parameter { name, .. } => name.clone(),
        }
    }

    pub fn slot(&self) -> SlotId {
        match &self.kind {
            PortKind::Placeholder { slot } | PortKind::Parameter { slot, .. } => *slot,
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self.kind, PortKind::Parameter { .. })
    }
}

/// The authoritative list of a dynamic node's inputs.
///
/// The host only ever sees [`PortTable::visible`], a projection holding the
/// pseudo-ports. Placeholders stay in this table, where their connection state
/// mirrors the pseudo-port bound to them.
#[derive(Clone, Debug, PartialEq)]
pub struct PortTable {
    ports: Vec<Port>,
}

impl Default for PortTable {
    fn default() -> Self {
        let ports = SlotId::all()
            .map(|slot| Port {
                kind: PortKind::Placeholder { slot },
                slot_type: PLACEHOLDER_TYPE.to_string(),
                link: None,
            })
            .collect();
        Self { ports }
    }
}

impl PortTable {
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| !p.is_visible())
    }

    pub fn pseudo_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter().filter(|p| p.is_visible())
    }

    pub fn placeholder(&self, slot: SlotId) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| p.kind == PortKind::Placeholder { slot })
    }

    fn placeholder_mut(&mut self, slot: SlotId) -> Option<&mut Port> {
        self.ports
            .iter_mut()
            .find(|p| p.kind == PortKind::Placeholder { slot })
    }

    pub fn pseudo(&self, name: &str) -> Option<&Port> {
        self.ports
            .iter()
            .find(|p| matches!(&p.kind, PortKind::Parameter { name: n, .. } if n == name))
    }

    fn pseudo_mut(&mut self, name: &str) -> Option<&mut Port> {
        self.ports
            .iter_mut()
            .find(|p| matches!(&p.kind, PortKind::Parameter { name: n, .. } if n == name))
    }

    /// Whether a parameter currently receives its value through a wire.
    pub fn is_wired(&self, name: &str) -> bool {
        self.pseudo(name).is_some_and(|p| p.link.is_some())
    }

    /// Resolves any input by name, rendered or not. `None` if the name is unknown.
    pub fn lookup(&self, name: &str) -> Option<Option<LinkId>> {
        if let Some(slot) = SlotId::parse(name) {
            return self.placeholder(slot).map(|p| p.link);
        }
        self.pseudo(name).map(|p| p.link)
    }

    /// Adds the pseudo-port for a parameter, or re-targets an existing one.
    ///
    /// Returns `false` when the placeholder it should pair with is missing.
    pub fn add_pseudo(
        &mut self,
        name: &str,
        slot: SlotId,
        slot_type: &str,
        link: Option<LinkId>,
    ) -> bool {
        let Some(placeholder) = self.placeholder(slot) else {
            return false;
        };
        // A placeholder the host wired directly hands its link over.
        let link = link.or(placeholder.link);
        match self.pseudo_mut(name) {
            Some(port) => {
                port.kind = PortKind::Parameter {
                    name: name.to_string(),
                    slot,
                };
                port.slot_type = slot_type.to_string();
                if link.is_some() {
                    port.link = link;
                }
            }
            None => self.ports.push(Port {
                kind: PortKind::Parameter {
                    name: name.to_string(),
                    slot,
                },
                slot_type: slot_type.to_string(),
                link,
            }),
        }
        self.mirror();
        true
    }

    /// Removes every pseudo-port, returning the links they carried by name.
    /// Placeholders lose their mirrored connections; links the host put on a
    /// placeholder directly stay.
    pub fn take_pseudo(&mut self) -> HashMap<String, LinkId> {
        let mut carried = HashMap::new();
        self.ports.retain(|port| match &port.kind {
            PortKind::Parameter { name, .. } => {
                if let Some(link) = port.link {
                    carried.insert(name.clone(), link);
                }
                false
            }
            PortKind::Placeholder { .. } => true,
        });
        for port in &mut self.ports {
            if port.link.is_some_and(|l| carried.values().any(|c| *c == l)) {
                port.link = None;
            }
        }
        carried
    }

    /// Drops every placeholder connection.
    pub fn clear_placeholder_links(&mut self) {
        for port in self.ports.iter_mut().filter(|p| !p.is_visible()) {
            port.link = None;
        }
    }

    /// Sets the connection state of a pseudo-port and mirrors it.
    pub fn set_link(&mut self, name: &str, link: Option<LinkId>) -> bool {
        let Some(port) = self.pseudo_mut(name) else {
            return false;
        };
        port.link = link;
        self.mirror();
        true
    }

    /// Copies each pseudo-port's connection onto its placeholder.
    pub fn mirror(&mut self) {
        let bound: Vec<(SlotId, Option<LinkId>)> = self
            .pseudo_ports()
            .map(|p| (p.slot(), p.link))
            .collect();
        for (slot, link) in bound {
            if let Some(placeholder) = self.placeholder_mut(slot) {
                placeholder.link = link;
            }
        }
    }

    /// Reads connection state back from a rendered input list the host may
    /// have changed.
    ///
    /// Rows naming a placeholder update that placeholder; rows naming a known
    /// pseudo-port update it. Links of rows naming anything else are returned.
    pub fn absorb_rendered(&mut self, rows: &[InputSlot]) -> HashMap<String, LinkId> {
        let mut unknown = HashMap::new();
        let rendered_pseudo: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();

        // A pseudo-port missing from the rendered rows lost its connection.
        for port in self.ports.iter_mut().filter(|p| p.is_visible()) {
            if !rendered_pseudo.contains(&port.name().as_str()) {
                port.link = None;
            }
        }

        for row in rows {
            if let Some(port) = self.pseudo_mut(&row.name) {
                port.link = row.link;
            } else if let Some(slot) = SlotId::parse(&row.name) {
                if let Some(placeholder) = self.placeholder_mut(slot)
                    && row.link.is_some()
                {
                    placeholder.link = row.link;
                }
            } else if let Some(link) = row.link {
                unknown.insert(row.name.clone(), link);
            }
        }
        unknown
    }

    /// Moves connections found on placeholders onto the unconnected pseudo-port
    /// bound to the same slot. Returns how many were moved.
    pub fn redirect_placeholder_links(&mut self) -> usize {
        let targets: Vec<(String, LinkId)> = self
            .pseudo_ports()
            .filter(|p| p.link.is_none())
            .filter_map(|p| {
                let link = self.placeholder(p.slot())?.link?;
                Some((p.name(), link))
            })
            .collect();

        let moved = targets.len();
        for (name, link) in targets {
            if let Some(port) = self.pseudo_mut(&name) {
                port.link = Some(link);
            }
        }
        self.mirror();
        moved
    }

    /// Placeholder connections no pseudo-port carries. The host cannot keep
    /// these: no rendered row holds them.
    pub fn stranded_links(&self) -> Vec<(SlotId, LinkId)> {
        self.placeholders()
            .filter_map(|p| {
                let link = p.link?;
                let carried = self
                    .pseudo_ports()
                    .any(|v| v.slot() == p.slot() && v.link == Some(link));
                (!carried).then_some((p.slot(), link))
            })
            .collect()
    }

    /// The rendered input list: pseudo-ports only, in creation order.
    pub fn visible(&self) -> Vec<InputSlot> {
        self.pseudo_ports()
            .map(|p| InputSlot {
                name: p.name(),
                slot_type: p.slot_type.clone(),
                link: p.link,
            })
            .collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders().count()
    }

    pub fn is_complete(&self) -> bool {
        self.placeholder_count() == POOL_CAPACITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn links(n: usize) -> Vec<LinkId> {
        let mut arena: SlotMap<LinkId, ()> = SlotMap::with_key();
        (0..n).map(|_| arena.insert(())).collect()
    }

    fn slot(n: usize) -> SlotId {
        SlotId::new(n).unwrap()
    }

    #[test]
    fn test_placeholders_never_visible() {
        let mut table = PortTable::default();
        assert!(table.visible().is_empty());
        assert!(table.is_complete());

        table.add_pseudo("prompt", slot(1), "STRING", None);
        let visible = table.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "prompt");
        assert_eq!(table.placeholder_count(), 20);
    }

    #[test]
    fn test_connection_mirrors_onto_placeholder() {
        let link = links(1)[0];
        let mut table = PortTable::default();
        table.add_pseudo("prompt", slot(3), "STRING", None);

        assert!(table.set_link("prompt", Some(link)));
        assert_eq!(table.lookup("param_3"), Some(Some(link)));
        assert!(table.is_wired("prompt"));

        table.set_link("prompt", None);
        assert_eq!(table.lookup("param_3"), Some(None));
        assert_eq!(table.lookup("unknown"), None);
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let mut table = PortTable::default();
        table.ports.retain(|p| p.slot() != slot(2));
        assert!(!table.add_pseudo("seed", slot(2), "INT", None));
        assert!(table.visible().is_empty());
    }

    #[test]
    fn test_absorb_and_redirect_host_wiring() {
        let ids = links(2);
        let mut table = PortTable::default();
        table.add_pseudo("prompt", slot(1), "STRING", None);

        let rows = vec![
            InputSlot {
                name: "param_1".to_string(),
                slot_type: PLACEHOLDER_TYPE.to_string(),
                link: Some(ids[0]),
            },
            InputSlot {
                name: "mystery".to_string(),
                slot_type: "*".to_string(),
                link: Some(ids[1]),
            },
        ];
        let unknown = table.absorb_rendered(&rows);
        assert_eq!(unknown.get("mystery"), Some(&ids[1]));

        assert_eq!(table.redirect_placeholder_links(), 1);
        assert_eq!(table.pseudo("prompt").and_then(|p| p.link), Some(ids[0]));
        assert!(table.stranded_links().is_empty());
    }

    #[test]
    fn test_take_pseudo_keeps_direct_placeholder_links() {
        let ids = links(2);
        let mut table = PortTable::default();
        table.add_pseudo("prompt", slot(1), "STRING", Some(ids[0]));
        table.placeholder_mut(slot(5)).unwrap().link = Some(ids[1]);

        let carried = table.take_pseudo();
        assert_eq!(carried.get("prompt"), Some(&ids[0]));
        assert_eq!(table.lookup("param_1"), Some(None));
        assert_eq!(table.stranded_links(), vec![(slot(5), ids[1])]);

        // A new pairing adopts the host's link.
        table.add_pseudo("seed", slot(5), "INT", None);
        assert!(table.is_wired("seed"));

        table.clear_placeholder_links();
        assert_eq!(table.lookup("param_5"), Some(None));
    }
}
