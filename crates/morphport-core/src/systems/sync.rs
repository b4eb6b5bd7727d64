//! # Port/Widget Synchronizer
//!
//! Keeps a node's rendered inputs and widgets in lock-step with its
//! [`NodeSession`]. Every function here is safe to call repeatedly: running it
//! twice against the same state leaves the same tables behind.

use crate::components::{
    ControlRole, DYNAMIC_STATE_KEY, MODEL_CACHE_KEY, ModelCacheBlob, NodeSession,
    Request, Response, Ticket, write_blob,
};
use crate::error::EngineError;
use crate::pool::SlotId;
use glam::Vec2;
use host_canvas::model::{InputSlot, Node, NodeFlags, Widget, WidgetKind, link_key};
use host_canvas::persistence::SavedInput;
use host_canvas::{ConnectionChange, HostConfig, InputLookup, LinkId, SavedNode, SlotKind};
use morphport_inspector::{FieldType, InspectorState, ParameterDescriptor, VisualField};
use serde_json::Value;
use std::collections::HashMap;

const CONTENT_MARKERS: &[&str] = &["prompt", "text", "description"];
const GENERATION_MARKERS: &[&str] = &[
    "seed", "width", "height", "steps", "guidance", "strength", "scale",
];

/// Rows a multiline text control occupies.
const MULTILINE_ROWS: f32 = 3.0;

/// Outcome of one [`rebuild`].
#[derive(Debug, Default, PartialEq)]
pub struct RebuildReport {
    pub controls: usize,
    pub ports: usize,
    /// Wire-eligible parameters left without a port because the pool was full.
    pub control_only: Vec<String>,
    /// Parameters whose control could not be built.
    pub failed: Vec<String>,
}

/// Static rank of a parameter name: content first, generation settings next,
/// everything else last.
pub fn priority_rank(name: &str) -> u8 {
    let name = name.to_lowercase();
    if CONTENT_MARKERS.iter().any(|m| name.contains(m)) {
        0
    } else if GENERATION_MARKERS.iter().any(|m| name.contains(m)) {
        1
    } else {
        2
    }
}

/// Parameters in the order they receive ports. Stable: equal keys keep
/// schema order.
pub fn allocation_order(parameters: &[ParameterDescriptor]) -> Vec<&ParameterDescriptor> {
    let mut ordered: Vec<&ParameterDescriptor> = parameters.iter().collect();
    ordered.sort_by_key(|d| (priority_rank(&d.name), !d.required));
    ordered
}

/// Builds the widget editing one parameter.
pub fn build_control(
    descriptor: &ParameterDescriptor,
    value: Option<&Value>,
) -> Result<Widget, EngineError> {
    let field = VisualField::from_descriptor(descriptor);
    let fail = |reason: &str| EngineError::Control {
        name: descriptor.name.clone(),
        reason: reason.to_string(),
    };

    let mut value = value.cloned().unwrap_or_else(|| field.initial_value());
    let kind = match &field.field_type {
        FieldType::Text { multiline } => WidgetKind::Text {
            multiline: *multiline,
        },
        FieldType::Number {
            min,
            max,
            step,
            integer,
        } => {
            if !value.is_number() && !value.is_null() {
                return Err(fail("value is not a number"));
            }
            WidgetKind::Number {
                min: *min,
                max: *max,
                step: *step,
                precision: if *integer { 0 } else { precision_of(*step) },
            }
        }
        FieldType::Boolean => WidgetKind::Toggle,
        FieldType::Select { options } => {
            if options.is_empty() {
                return Err(fail("enum has no options"));
            }
            WidgetKind::Combo {
                values: options.clone(),
            }
        }
        FieldType::Json => {
            if !value.is_string() && !value.is_null() {
                value = Value::String(value.to_string());
            }
            WidgetKind::Text { multiline: true }
        }
    };

    let mut widget = Widget::new(descriptor.name.clone(), kind, value);
    widget.label = field.label;
    widget.tooltip = (!field.tooltip.is_empty()).then_some(field.tooltip);
    Ok(widget)
}

fn precision_of(step: f64) -> u8 {
    let text = step.to_string();
    text.split_once('.')
        .map_or(0, |(_, fraction)| fraction.len().min(6) as u8)
}

/// Recreates every parameter control and pseudo-port for the current
/// parameter list.
///
/// `carried` holds connections found on rendered rows before the pseudo-ports
/// existed; they are re-attached by parameter name. Existing pseudo-ports keep
/// their connections.
pub fn rebuild(session: &mut NodeSession, carried: HashMap<String, LinkId>) -> RebuildReport {
    let mut links = session.ports.take_pseudo();
    for (name, link) in carried {
        links.entry(name).or_insert(link);
    }
    session.controls.clear_parameters();

    let names: Vec<String> = session
        .state
        .parameters
        .iter()
        .map(|d| d.name.clone())
        .collect();
    session.state.pool.retain_parameters(|name| names.iter().any(|n| n == name));

    let mut report = RebuildReport::default();
    let parameters = session.state.parameters.clone();
    for descriptor in allocation_order(&parameters) {
        let name = descriptor.name.as_str();

        match build_control(descriptor, session.state.values.get(name)) {
            Ok(widget) => {
                session.controls.push_parameter(name, widget);
                report.controls += 1;
            }
            Err(e) => {
                tracing::warn!(parameter = name, error = %e, "Skipping parameter control");
                report.failed.push(name.to_string());
            }
        }

        if !descriptor.is_wire_eligible() {
            continue;
        }
        let Some(binding) = session.state.pool.allocate(descriptor) else {
            tracing::warn!(
                parameter = name,
                "Placeholder pool exhausted; parameter is control-only"
            );
            report.control_only.push(name.to_string());
            continue;
        };
        let added = session.ports.add_pseudo(
            name,
            binding.placeholder,
            binding.backend_type.slot_type(),
            links.remove(name),
        );
        if added {
            report.ports += 1;
        } else {
            tracing::warn!(
                parameter = name,
                slot = %binding.placeholder,
                "Missing placeholder; skipping port"
            );
        }
    }

    for (name, link) in links {
        tracing::debug!(parameter = %name, link = link_key(link), "Connection lost its port");
    }

    session.ports.redirect_placeholder_links();
    session.inspector = InspectorState::from_descriptors(&parameters);
    session.refresh_hidden();
    tracing::debug!(
        model_id = session.state.model_id.as_deref().unwrap_or_default(),
        controls = report.controls,
        ports = report.ports,
        "Rebuilt parameter controls"
    );
    report
}

/// Tears down parameter controls and pseudo-ports and frees the pool. The
/// selectors stay.
pub fn reset(session: &mut NodeSession) {
    let dropped = session.ports.take_pseudo();
    session.ports.clear_placeholder_links();
    session.controls.clear_parameters();
    session.state.pool.release_all();
    session.state.parameters.clear();
    session.state.values.clear();
    session.inspector = InspectorState::default();
    session.refresh_hidden();
    tracing::debug!(dropped_links = dropped.len(), "Reset parameter controls");
}

/// Replaces the parameter list with a freshly parsed schema.
///
/// Values already held for parameters that still exist are kept; missing ones
/// are seeded from schema defaults.
pub fn apply_schema(session: &mut NodeSession, parameters: Vec<ParameterDescriptor>) -> RebuildReport {
    let state = &mut session.state;
    state
        .values
        .retain(|name, _| parameters.iter().any(|d| d.name == *name));
    for descriptor in &parameters {
        if let Some(default) = &descriptor.default {
            state
                .values
                .entry(descriptor.name.clone())
                .or_insert_with(|| default.clone());
        }
    }
    state.parameters = parameters;
    rebuild(session, HashMap::new())
}

/// Handles a new category selection. Returns whether anything changed.
pub fn select_category(session: &mut NodeSession, value: &Value) -> bool {
    let raw = value.as_str().unwrap_or_default().trim();
    let category = session
        .categories
        .iter()
        .find(|c| c.name == raw || c.value == raw)
        .map(|c| c.value.clone())
        .or_else(|| (!raw.is_empty()).then(|| raw.to_string()));

    if category == session.state.category {
        return false;
    }

    reset(session);
    session.state.category = category.clone();
    session.state.model_id = None;
    session.state.model_name = None;
    session.models.clear();
    session.controls.set_value(&ControlRole::CategorySelector, value.clone());
    session.controls.set_options(&ControlRole::ModelSelector, Vec::new());
    session
        .controls
        .set_value(&ControlRole::ModelSelector, Value::String(String::new()));
    session.refresh_hidden();

    if let Some(category) = category {
        tracing::info!(category = %category, "Category selected");
        session.request(Request::Models { category });
    }
    true
}

/// Handles a new model selection. Switching models always frees every slot.
pub fn select_model(session: &mut NodeSession, value: &Value) -> bool {
    let raw = value.as_str().unwrap_or_default().trim();
    let (model_id, model_name) = match session
        .models
        .iter()
        .find(|m| m.name == raw || m.value == raw)
    {
        Some(model) => (Some(model.value.clone()), Some(model.name.clone())),
        None if raw.is_empty() => (None, None),
        None => (Some(raw.to_string()), None),
    };

    if model_id == session.state.model_id {
        return false;
    }

    reset(session);
    session.state.model_id = model_id.clone();
    session.state.model_name = model_name.clone();
    let display = model_name.or_else(|| model_id.clone()).unwrap_or_default();
    session
        .controls
        .set_value(&ControlRole::ModelSelector, Value::String(display));
    session.refresh_hidden();

    if let Some(model_id) = model_id {
        tracing::info!(model_id = %model_id, "Model selected");
        session.request(Request::Schema { model_id });
    } else {
        tracing::info!("Model selection cleared");
    }
    true
}

pub fn set_parameter_value(session: &mut NodeSession, name: &str, value: &Value) {
    session.state.values.insert(name.to_string(), value.clone());
    session.refresh_hidden();
}

/// Applies a fetched result. Stale results are discarded.
pub fn apply_response(session: &mut NodeSession, ticket: &Ticket, response: Response) -> bool {
    if !session.is_current(ticket) {
        tracing::warn!(request = ?ticket.request, "Discarding stale schema service result");
        return false;
    }

    match response {
        Response::Categories(categories) => {
            let names = categories.iter().map(|c| Value::String(c.name.clone())).collect();
            session.controls.set_options(&ControlRole::CategorySelector, names);
            // A restored selection shows its raw value until the list arrives.
            if let Some(entry) = categories
                .iter()
                .find(|c| session.state.category.as_deref() == Some(c.value.as_str()))
            {
                session
                    .controls
                    .set_value(&ControlRole::CategorySelector, Value::String(entry.name.clone()));
            }
            session.categories = categories;
        }
        Response::Models(models) => {
            let names = models.iter().map(|m| Value::String(m.name.clone())).collect();
            session.controls.set_options(&ControlRole::ModelSelector, names);
            if let Some(entry) = models
                .iter()
                .find(|m| session.state.model_id.as_deref() == Some(m.value.as_str()))
            {
                session
                    .controls
                    .set_value(&ControlRole::ModelSelector, Value::String(entry.name.clone()));
                session.state.model_name.get_or_insert_with(|| entry.name.clone());
            }
            session.models = models;
        }
        Response::ModelName(Some(name)) => {
            session
                .controls
                .set_value(&ControlRole::ModelSelector, Value::String(name.clone()));
            session.state.model_name = Some(name);
        }
        Response::ModelName(None) => return false,
        Response::Schema(None) => {
            tracing::warn!(request = ?ticket.request, "No schema available for model");
            return false;
        }
        Response::Schema(Some(schema)) => match morphport_inspector::parse(&schema) {
            Ok(parameters) => {
                apply_schema(session, parameters);
            }
            Err(e) => {
                tracing::warn!(request = ?ticket.request, error = %e, "Unusable model schema");
                return false;
            }
        },
    }
    true
}

/// Mirrors a connection change on a rendered pseudo-port onto its placeholder.
pub fn mirror_connection(
    session: &mut NodeSession,
    rendered: &[InputSlot],
    change: &ConnectionChange,
) -> bool {
    if change.kind != SlotKind::Input {
        return false;
    }
    let Some(row) = rendered.get(change.index) else {
        return false;
    };
    let link = if change.connected { change.link } else { None };

    let mirrored = if SlotId::parse(&row.name).is_some() {
        // The host wired a placeholder row directly.
        session.ports.absorb_rendered(rendered);
        session.ports.redirect_placeholder_links() > 0
    } else {
        session.ports.set_link(&row.name, link)
    };

    if mirrored {
        tracing::debug!(input = %row.name, connected = change.connected, "Mirrored connection");
        session.refresh_hidden();
    }
    mirrored
}

/// Pushes the session's visible tables into the host node. Returns whether the
/// rendered lists changed.
pub fn apply(session: &NodeSession, node: &mut Node) -> bool {
    let inputs = session.ports.visible();
    let widgets = session.controls.visible();
    let changed = node.inputs != inputs || node.widgets != widgets;
    node.inputs = inputs;
    node.widgets = widgets;
    if changed {
        node.flags.insert(NodeFlags::DIRTY);
    }
    changed
}

/// Re-asserts the visibility invariant against whatever the host did to the
/// rendered lists, then re-applies the projection.
pub fn reconcile(session: &mut NodeSession, node: &mut Node) -> bool {
    let foreign = session.ports.absorb_rendered(&node.inputs);
    for (name, link) in &foreign {
        tracing::warn!(input = %name, link = link_key(*link), "Dropping connection on unknown input");
    }
    let redirected = session.ports.redirect_placeholder_links();
    for (slot, link) in session.ports.stranded_links() {
        tracing::warn!(%slot, link = link_key(link), "Placeholder connection has no port");
    }

    for role in session.controls.absorb_values(&node.widgets) {
        if let ControlRole::Parameter { name } = role
            && let Some(control) = session.controls.parameter(&name)
        {
            let value = control.widget.value.clone();
            session.state.values.insert(name, value);
        }
    }

    session.refresh_hidden();
    apply(session, node) || redirected > 0
}

/// Lets saved workflows carry what the host cannot see: placeholder
/// connections and the dynamic state blobs.
pub fn serialize(session: &NodeSession, saved: &mut SavedNode) {
    for input in &mut saved.inputs {
        if session.ports.pseudo(&input.name).is_some() {
            input.pseudo = Some(input.name.clone());
        }
    }
    saved.inputs.extend(session.ports.placeholders().map(|p| SavedInput {
        name: p.name(),
        slot_type: p.slot_type.clone(),
        link: p.link.map(link_key),
        pseudo: None,
    }));

    let blob = session.state.to_blob();
    write_blob(&mut saved.properties, DYNAMIC_STATE_KEY, &blob);
    if session.state.has_model() {
        write_blob(&mut saved.properties, MODEL_CACHE_KEY, &ModelCacheBlob::now(blob));
    }
}

/// Node size from the authoritative tables. Multiline text controls take
/// several rows.
pub fn measure(session: &NodeSession, node: &Node, config: &HostConfig, current: Vec2) -> Vec2 {
    if node.flags.contains(NodeFlags::COLLAPSED) {
        return current;
    }
    let rows = session.ports.pseudo_ports().count().max(node.outputs.len()) as f32;
    let widget_rows: f32 = session
        .controls
        .iter()
        .map(|c| match c.widget.kind {
            WidgetKind::Text { multiline: true } => MULTILINE_ROWS,
            _ => 1.0,
        })
        .sum();
    let height = config.title_height
        + rows * config.slot_height
        + widget_rows * config.widget_height
        + config.padding;
    Vec2::new(current.x, height)
}

/// Resolves any input by name, placeholders included.
pub fn lookup(session: &NodeSession, name: &str) -> Option<InputLookup> {
    session
        .ports
        .lookup(name)
        .map(|link| link.map_or(InputLookup::Unlinked, InputLookup::Linked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Phase, Selection};
    use crate::service::ModelRef;
    use morphport_inspector::DisplayType;
    use serde_json::json;

    fn descriptor(name: &str, display_type: DisplayType, required: bool) -> ParameterDescriptor {
        let mut d = ParameterDescriptor::new(name, display_type);
        d.required = required;
        d
    }

    fn session_with(parameters: Vec<ParameterDescriptor>) -> NodeSession {
        let mut session = NodeSession::default();
        session.state.model_id = Some("m".to_string());
        session.phase = Phase::Fresh;
        apply_schema(&mut session, parameters);
        session
    }

    #[test]
    fn test_priority_order() {
        let parameters = vec![
            descriptor("mode", DisplayType::String, true),
            descriptor("width", DisplayType::Int, false),
            descriptor("seed", DisplayType::Int, true),
            descriptor("negative_prompt", DisplayType::String, false),
            descriptor("prompt", DisplayType::String, true),
        ];
        let order: Vec<&str> = allocation_order(&parameters)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(order, vec!["prompt", "negative_prompt", "seed", "width", "mode"]);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut session = session_with(vec![
            descriptor("prompt", DisplayType::String, true),
            descriptor("aspect", DisplayType::Enum, false),
        ]);
        // Enum without options cannot get a control; it is not wire-eligible.
        assert_eq!(session.controls.parameter_count(), 1);

        let before_ports = session.ports.clone();
        let before_controls = session.controls.clone();
        let report = rebuild(&mut session, HashMap::new());
        assert_eq!(report.failed, vec!["aspect".to_string()]);
        assert_eq!(session.ports, before_ports);
        assert_eq!(session.controls, before_controls);
        assert_eq!(session.state.pool.bound_count(), 1);
    }

    #[test]
    fn test_pool_exhaustion_leaves_controls() {
        let parameters = (0..22)
            .map(|i| descriptor(&format!("p{i}"), DisplayType::String, false))
            .collect();
        let mut session = NodeSession::default();
        session.state.model_id = Some("m".to_string());
        let report = apply_schema(&mut session, parameters);

        assert_eq!(report.controls, 22);
        assert_eq!(report.ports, 20);
        assert_eq!(report.control_only, vec!["p20".to_string(), "p21".to_string()]);
        assert_eq!(session.controls.parameter_count(), 22);
        assert_eq!(session.ports.visible().len(), 20);
    }

    #[test]
    fn test_schema_defaults_seed_values() {
        let mut seed = descriptor("seed", DisplayType::Int, false);
        seed.default = Some(json!(-1));
        let session = session_with(vec![seed]);

        assert_eq!(session.state.values.get("seed"), Some(&json!(-1)));
        assert_eq!(
            session.controls.parameter("seed").map(|c| &c.widget.value),
            Some(&json!(-1))
        );
        assert_eq!(session.hidden.request_json, r#"{"seed":-1}"#);
    }

    #[test]
    fn test_missing_required_tracked() {
        let mut session = session_with(vec![
            descriptor("prompt", DisplayType::String, true),
            descriptor("seed", DisplayType::Int, false),
        ]);
        assert_eq!(session.missing_required(), vec!["prompt"]);

        set_parameter_value(&mut session, "prompt", &json!("a cat"));
        assert!(session.missing_required().is_empty());

        set_parameter_value(&mut session, "prompt", &json!(""));
        assert_eq!(session.missing_required(), vec!["prompt"]);
        reset(&mut session);
        assert!(session.inspector.is_valid());
    }

    #[test]
    fn test_model_switch_releases_slots() {
        let mut session = session_with(vec![
            descriptor("prompt", DisplayType::String, true),
            descriptor("image_url", DisplayType::String, true),
        ]);
        session.models = vec![ModelRef {
            name: "B".to_string(),
            value: "model-b".to_string(),
        }];
        assert_eq!(session.state.pool.bound_count(), 2);

        assert!(select_model(&mut session, &json!("B")));
        assert_eq!(session.state.model_id.as_deref(), Some("model-b"));
        assert_eq!(session.state.pool.bound_count(), 0);
        assert_eq!(session.controls.parameter_count(), 0);
        assert!(session.ports.visible().is_empty());
        assert!(session.has_pending());

        apply_schema(&mut session, vec![descriptor("text", DisplayType::String, true)]);
        assert_eq!(
            session.state.pool.binding("text").map(|b| b.placeholder.number()),
            Some(1)
        );
    }

    #[test]
    fn test_stale_schema_discarded() {
        let mut session = NodeSession::default();
        select_model(&mut session, &json!("model-a"));
        let tickets = session.take_tickets();
        assert_eq!(tickets.len(), 1);
        assert_eq!(
            tickets[0].issued_for,
            Selection {
                category: None,
                model_id: Some("model-a".to_string())
            }
        );

        select_model(&mut session, &json!("model-b"));
        let schema = json!({"properties": {"prompt": {"type": "string"}}});
        assert!(!apply_response(
            &mut session,
            &tickets[0],
            Response::Schema(Some(schema))
        ));
        assert!(session.state.parameters.is_empty());
    }

    #[test]
    fn test_schema_for_replaced_model_discarded() {
        let mut session = NodeSession::default();
        select_model(&mut session, &json!("model-a"));
        select_model(&mut session, &json!("model-b"));

        // Both requests were queued before anything was fetched.
        let tickets = session.take_tickets();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].issued_for.model_id.as_deref(), Some("model-a"));

        let schema = json!({"properties": {"mode": {"type": "string"}}});
        assert!(!apply_response(&mut session, &tickets[0], Response::Schema(Some(schema))));
        assert!(session.state.parameters.is_empty());
        assert_eq!(session.state.pool.bound_count(), 0);

        let schema = json!({"properties": {"seed": {"type": "integer", "default": -1}}});
        assert!(apply_response(&mut session, &tickets[1], Response::Schema(Some(schema))));
        assert_eq!(session.state.values.get("seed"), Some(&json!(-1)));
    }

    #[test]
    fn test_category_change_clears_model() {
        let mut session = session_with(vec![descriptor("prompt", DisplayType::String, true)]);
        session.state.category = Some("text-to-image".to_string());

        assert!(select_category(&mut session, &json!("image-to-video")));
        assert_eq!(session.state.model_id, None);
        assert!(session.state.parameters.is_empty());
        assert_eq!(session.hidden, Default::default());
        assert!(!select_category(&mut session, &json!("image-to-video")));
    }

    #[test]
    fn test_build_control_kinds() {
        let mut steps = descriptor("num_steps", DisplayType::Int, false);
        steps.step = Some(1.0);
        let widget = build_control(&steps, Some(&json!(30))).unwrap();
        assert!(matches!(widget.kind, WidgetKind::Number { precision: 0, .. }));
        assert_eq!(widget.label, "Num Steps");

        let mut cfg = descriptor("cfg", DisplayType::Float, false);
        cfg.step = Some(0.05);
        let widget = build_control(&cfg, None).unwrap();
        assert!(matches!(widget.kind, WidgetKind::Number { precision: 2, .. }));

        assert!(build_control(&steps, Some(&json!("thirty"))).is_err());

        let config = descriptor("extra", DisplayType::Object, false);
        let widget = build_control(&config, Some(&json!({"a": 1}))).unwrap();
        assert_eq!(widget.value, json!(r#"{"a":1}"#));
    }
}
