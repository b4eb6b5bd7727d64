use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a parameter is presented and edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayType {
    String,
    Int,
    Float,
    Boolean,
    Enum,
    Object,
}

/// Declared type of the items of an array parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
}

impl ItemType {
    pub fn from_schema(name: &str) -> Self {
        match name {
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "object" | "array" => Self::Object,
            _ => Self::String,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

/// Normalized view of one schema property.
///
/// Immutable once parsed; it lives as long as the schema fetch it came from
/// (or the restored snapshot that embedded it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    pub name: String,
    pub display_type: DisplayType,
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub array_item_type: Option<ItemType>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub enum_options: Vec<Value>,
    #[serde(default)]
    pub description: String,
}

impl ParameterDescriptor {
    /// A plain descriptor with no metadata; mostly useful for tests and
    /// hand-built parameter lists.
    pub fn new(name: impl Into<String>, display_type: DisplayType) -> Self {
        Self {
            name: name.into(),
            display_type,
            required: false,
            default: None,
            is_array: false,
            array_item_type: None,
            min: None,
            max: None,
            step: None,
            enum_options: Vec::new(),
            description: String::new(),
        }
    }

    /// Whether the parameter can be fed by an incoming wire.
    ///
    /// Scalars of primitive type are; enums and objects stay control-only.
    /// Arrays qualify when their items are primitive.
    pub fn is_wire_eligible(&self) -> bool {
        if self.is_array {
            return !matches!(self.array_item_type, Some(ItemType::Object));
        }
        matches!(
            self.display_type,
            DisplayType::String | DisplayType::Int | DisplayType::Float | DisplayType::Boolean
        )
    }

    pub fn is_numeric(&self) -> bool {
        !self.is_array && matches!(self.display_type, DisplayType::Int | DisplayType::Float)
    }
}
