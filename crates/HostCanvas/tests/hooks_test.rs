use glam::Vec2;
use host_canvas::model::{InputSlot, WidgetKind};
use host_canvas::{
    ConnectionChange, Editor, HostError, InputLookup, Node, NodeDefinition, NodeHooks, SavedNode,
    SlotDef, WidgetDef,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

type Journal = Arc<Mutex<Vec<String>>>;

/// Records every hook call, prefixed with its tag.
struct Recorder {
    tag: &'static str,
    journal: Journal,
}

impl Recorder {
    fn note(&self, event: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.tag, event));
    }
}

impl NodeHooks for Recorder {
    fn on_created(&mut self, _node: &mut Node) {
        self.note("created");
    }

    fn on_configure(&mut self, _node: &mut Node, _saved: &SavedNode) {
        self.note("configure");
    }

    fn on_added(&mut self, _node: &mut Node) {
        self.note("added");
    }

    fn on_connections_change(&mut self, _node: &mut Node, change: &ConnectionChange) {
        self.note(&format!("connection:{}:{}", change.index, change.connected));
    }

    fn on_widget_changed(&mut self, _node: &mut Node, widget: &str, _value: &Value) {
        self.note(&format!("widget:{widget}"));
    }

    fn compute_size(&self, _node: &Node, current: Vec2) -> Vec2 {
        current + Vec2::new(0.0, 10.0)
    }

    fn on_removed(&mut self, _node: &Node) {
        self.note("removed");
    }
}

/// Hides its only declared input behind a single rendered `proxy` row.
struct Proxy;

impl NodeHooks for Proxy {
    fn on_created(&mut self, node: &mut Node) {
        node.inputs = vec![InputSlot::new("proxy", "*")];
    }

    fn lookup_input(&self, node: &Node, name: &str) -> Option<InputLookup> {
        (name == "hidden").then(|| match node.inputs[0].link {
            Some(link) => InputLookup::Linked(link),
            None => InputLookup::Unlinked,
        })
    }
}

fn definition(node_type: &str) -> NodeDefinition {
    NodeDefinition {
        node_type: node_type.to_string(),
        title: node_type.to_string(),
        inputs: vec![SlotDef::new("in", "*")],
        outputs: vec![SlotDef::new("out", "*")],
        widgets: vec![WidgetDef {
            name: "text".to_string(),
            kind: WidgetKind::Text { multiline: false },
            default: json!(""),
        }],
    }
}

fn recorded_editor(journal: &Journal) -> Editor {
    let mut editor = Editor::default();
    editor.register_type(definition("Recorded"));
    for tag in ["first", "second"] {
        let journal = journal.clone();
        editor.register_extension(
            "Recorded",
            Box::new(move |_node: &Node| -> Box<dyn NodeHooks> {
                Box::new(Recorder {
                    tag,
                    journal: journal.clone(),
                })
            }),
        );
    }
    editor
}

#[test]
fn test_chained_hooks_run_in_registration_order() {
    let journal = Journal::default();
    let mut editor = recorded_editor(&journal);

    let id = editor.add_node("Recorded").unwrap();
    editor.set_widget_value(id, "text", json!("hello")).unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "first:created",
            "second:created",
            "first:added",
            "second:added",
            "first:widget:text",
            "second:widget:text",
        ]
    );
    assert_eq!(editor.graph.nodes[id].widget("text").unwrap().value, json!("hello"));
}

#[test]
fn test_compute_size_folds_through_the_chain() {
    let journal = Journal::default();
    let mut editor = recorded_editor(&journal);
    let id = editor.add_node("Recorded").unwrap();

    let config = editor.config.clone();
    let base = config.title_height + config.slot_height + config.widget_height + config.padding;
    assert_eq!(editor.graph.nodes[id].size.y, base + 20.0);
}

#[test]
fn test_connection_notifies_both_ends() {
    let journal = Journal::default();
    let mut editor = recorded_editor(&journal);
    let origin = editor.add_node("Recorded").unwrap();
    let target = editor.add_node("Recorded").unwrap();
    journal.lock().unwrap().clear();

    let link = editor.connect(origin, 0, target, 0).unwrap();
    assert_eq!(editor.graph.nodes[target].inputs[0].link, Some(link));
    assert_eq!(editor.graph.nodes[origin].outputs[0].links, vec![link]);
    assert_eq!(journal.lock().unwrap().len(), 4);

    assert!(editor.disconnect_input(target, 0).unwrap());
    assert!(editor.graph.links.is_empty());
    assert!(!editor.disconnect_input(target, 0).unwrap());
    assert!(
        journal
            .lock()
            .unwrap()
            .contains(&"second:connection:0:false".to_string())
    );
}

#[test]
fn test_removed_node_runs_its_hooks() {
    let journal = Journal::default();
    let mut editor = recorded_editor(&journal);
    let id = editor.add_node("Recorded").unwrap();

    assert!(editor.remove_node(id).is_some());
    assert_eq!(journal.lock().unwrap().last().unwrap(), "second:removed");
    assert!(editor.graph.nodes.is_empty());
}

#[test]
fn test_lookup_reaches_inputs_the_node_does_not_render() {
    let mut editor = Editor::default();
    editor.register_type(definition("Source"));
    editor.register_type(definition("Proxied"));
    editor.register_extension(
        "Proxied",
        Box::new(|_node: &Node| -> Box<dyn NodeHooks> { Box::new(Proxy) }),
    );

    let source = editor.add_node("Source").unwrap();
    let target = editor.add_node("Proxied").unwrap();
    assert_eq!(editor.graph.nodes[target].inputs[0].name, "proxy");
    assert!(editor.input_link(target, "hidden").is_none());

    let link = editor.connect(source, 0, target, 0).unwrap();
    assert_eq!(editor.input_link(target, "hidden").map(|l| l.id), Some(link));
    // Without the hook the host falls back to rendered rows.
    assert_eq!(editor.input_link(target, "proxy").map(|l| l.id), Some(link));
    assert!(editor.input_link(target, "in").is_none());
}

#[test]
fn test_editor_errors() {
    let mut editor = Editor::default();
    editor.register_type(definition("Plain"));
    let id = editor.add_node("Plain").unwrap();

    assert_eq!(
        editor.add_node("Missing").unwrap_err(),
        HostError::UnknownNodeType("Missing".to_string())
    );
    assert!(matches!(
        editor.connect(id, 3, id, 0),
        Err(HostError::SlotOutOfRange { kind: "output", index: 3, .. })
    ));
    assert!(matches!(
        editor.set_widget_value(id, "nope", json!(1)),
        Err(HostError::WidgetNotFound { .. })
    ));
}

#[test]
fn test_sync_links_follows_rendered_rows() {
    let mut editor = Editor::default();
    editor.register_type(definition("Plain"));
    let origin = editor.add_node("Plain").unwrap();
    let target = editor.add_node("Plain").unwrap();
    let link = editor.connect(origin, 0, target, 0).unwrap();

    // A new row in front of the linked one moves the link's index.
    editor.with_node_mut(target, |node| node.inputs.insert(0, InputSlot::new("front", "*")));
    assert_eq!(editor.graph.links[link].target_slot, 1);

    // A link no rendered row carries is dropped from both ends.
    editor.with_node_mut(target, |node| node.inputs.truncate(1));
    assert!(editor.graph.links.is_empty());
    assert!(editor.graph.nodes[origin].outputs[0].links.is_empty());
}
