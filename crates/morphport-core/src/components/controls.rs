use host_canvas::model::{Widget, WidgetKind};
use serde_json::Value;

pub const CATEGORY_WIDGET: &str = "Category";
pub const MODEL_WIDGET: &str = "Model";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlRole {
    CategorySelector,
    ModelSelector,
    Parameter { name: String },
}

/// A rendered control and what it stands for.
#[derive(Clone, Debug, PartialEq)]
pub struct Control {
    pub role: ControlRole,
    pub widget: Widget,
}

/// The controls a dynamic node renders: the two selectors, then one control
/// per parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlTable {
    controls: Vec<Control>,
}

impl Default for ControlTable {
    fn default() -> Self {
        let selector = |name: &str, role| Control {
            role,
            widget: Widget::new(
                name,
                WidgetKind::Combo { values: Vec::new() },
                Value::String(String::new()),
            ),
        };
        Self {
            controls: vec![
                selector(CATEGORY_WIDGET, ControlRole::CategorySelector),
                selector(MODEL_WIDGET, ControlRole::ModelSelector),
            ],
        }
    }
}

impl ControlTable {
    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    /// Resolves a widget name to the role of the control rendering it.
    pub fn role_of(&self, widget: &str) -> Option<&ControlRole> {
        self.controls
            .iter()
            .find(|c| c.widget.name == widget)
            .map(|c| &c.role)
    }

    pub fn get(&self, role: &ControlRole) -> Option<&Control> {
        self.controls.iter().find(|c| c.role == *role)
    }

    fn get_mut(&mut self, role: &ControlRole) -> Option<&mut Control> {
        self.controls.iter_mut().find(|c| c.role == *role)
    }

    pub fn parameter(&self, name: &str) -> Option<&Control> {
        self.get(&ControlRole::Parameter {
            name: name.to_string(),
        })
    }

    pub fn selector_value(&self, role: &ControlRole) -> Option<&Value> {
        self.get(role).map(|c| &c.widget.value)
    }

    pub fn set_value(&mut self, role: &ControlRole, value: Value) -> bool {
        match self.get_mut(role) {
            Some(control) => {
                control.widget.value = value;
                true
            }
            None => false,
        }
    }

    pub fn set_options(&mut self, role: &ControlRole, values: Vec<Value>) {
        if let Some(control) = self.get_mut(role) {
            control.widget.kind = WidgetKind::Combo { values };
        }
    }

    /// Adds a parameter control. An existing control for the same parameter is
    /// replaced in place.
    pub fn push_parameter(&mut self, name: &str, widget: Widget) {
        let role = ControlRole::Parameter {
            name: name.to_string(),
        };
        match self.get_mut(&role) {
            Some(control) => control.widget = widget,
            None => self.controls.push(Control { role, widget }),
        }
    }

    /// Removes every parameter control, keeping the selectors.
    pub fn clear_parameters(&mut self) -> usize {
        let before = self.controls.len();
        self.controls
            .retain(|c| !matches!(c.role, ControlRole::Parameter { .. }));
        before - self.controls.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.controls
            .iter()
            .filter(|c| matches!(c.role, ControlRole::Parameter { .. }))
            .count()
    }

    /// Picks up values the host wrote into rendered widgets directly and
    /// returns the roles that changed.
    pub fn absorb_values(&mut self, rendered: &[Widget]) -> Vec<ControlRole> {
        let mut changed = Vec::new();
        for widget in rendered {
            if let Some(control) = self.controls.iter_mut().find(|c| c.widget.name == widget.name)
                && control.widget.value != widget.value
            {
                control.widget.value = widget.value.clone();
                changed.push(control.role.clone());
            }
        }
        changed
    }

    /// The rendered widget list.
    pub fn visible(&self) -> Vec<Widget> {
        self.controls.iter().map(|c| c.widget.clone()).collect()
    }
}
