use crate::error::EngineError;
use crate::pool::{BackendType, ParameterMapping, PlaceholderPool};
use chrono::{DateTime, Utc};
use morphport_inspector::{DisplayType, ParameterDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Node property holding the execution-authoritative snapshot.
pub const DYNAMIC_STATE_KEY: &str = "dynamicState";
/// Node property holding the timestamped snapshot used for re-display.
pub const MODEL_CACHE_KEY: &str = "modelCache";

/// Names of the three hidden backend-facing fields, in widget order.
pub const HIDDEN_FIELDS: [&str; 3] = ["model_id", "request_json", "param_map"];

/// What the user has selected. Captured when a request is queued and compared
/// when its result arrives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Selection {
    pub category: Option<String>,
    pub model_id: Option<String>,
}

/// Everything a dynamic node knows about its selected schema.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeDynamicState {
    pub category: Option<String>,
    pub model_id: Option<String>,
    pub model_name: Option<String>,
    /// Parsed parameters, in schema order.
    pub parameters: Vec<ParameterDescriptor>,
    /// Current value per parameter. Absent means "no value".
    pub values: BTreeMap<String, Value>,
    pub pool: PlaceholderPool,
}

impl NodeDynamicState {
    pub fn selection(&self) -> Selection {
        Selection {
            category: self.category.clone(),
            model_id: self.model_id.clone(),
        }
    }

    pub fn has_model(&self) -> bool {
        self.model_id.as_deref().is_some_and(|m| !m.is_empty())
    }

    pub fn mapping(&self) -> &ParameterMapping {
        self.pool.mapping()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|d| d.name == name)
    }

    /// The backend request body: every parameter not fed by a wire.
    ///
    /// Array values are converted from their edited text form. A required
    /// parameter without a value is kept as `""` (text and arrays) or `null`;
    /// optional ones without a value are left out.
    pub fn request_values(&self, is_wired: impl Fn(&str) -> bool) -> Map<String, Value> {
        let mut request = Map::new();
        for descriptor in &self.parameters {
            if is_wired(&descriptor.name) {
                continue;
            }
            let value = match self.values.get(&descriptor.name) {
                Some(value) if !value.is_null() => request_value(descriptor, value),
                _ if descriptor.required => empty_value(descriptor),
                _ => continue,
            };
            request.insert(descriptor.name.clone(), value);
        }
        request
    }

    pub fn to_blob(&self) -> DynamicStateBlob {
        DynamicStateBlob {
            category: self.category.clone(),
            model_id: self.model_id.clone(),
            model_name: self.model_name.clone(),
            parameters: self.parameters.clone(),
            values: self.values.clone(),
            mapping: self.mapping().clone(),
        }
    }

    pub fn from_blob(blob: DynamicStateBlob) -> Self {
        Self {
            pool: PlaceholderPool::from_mapping(&blob.mapping),
            category: blob.category,
            model_id: blob.model_id,
            model_name: blob.model_name,
            parameters: blob.parameters,
            values: blob.values,
        }
    }
}

fn request_value(descriptor: &ParameterDescriptor, value: &Value) -> Value {
    if descriptor.is_array {
        return BackendType::for_descriptor(descriptor).coerce(value);
    }
    match (descriptor.display_type, value) {
        // Objects are edited as JSON text.
        (DisplayType::Object, Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| value.clone())
        }
        _ => value.clone(),
    }
}

fn empty_value(descriptor: &ParameterDescriptor) -> Value {
    if descriptor.is_array || descriptor.display_type == DisplayType::String {
        Value::String(String::new())
    } else {
        Value::Null
    }
}

/// Persisted form of [`NodeDynamicState`]. Carries the parsed parameter list so
/// a saved graph reopens without the schema service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicStateBlob {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub mapping: ParameterMapping,
}

/// The re-display snapshot: same content, stamped with when it was taken.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelCacheBlob {
    #[serde(flatten)]
    pub state: DynamicStateBlob,
    pub timestamp: DateTime<Utc>,
}

impl ModelCacheBlob {
    pub fn now(state: DynamicStateBlob) -> Self {
        Self {
            state,
            timestamp: Utc::now(),
        }
    }
}

/// Reads a blob stored under `key`. `Ok(None)` when the property is absent.
pub fn read_blob<T: DeserializeOwned>(
    properties: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<T>, EngineError> {
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|source| EngineError::MalformedBlob { what: key, source }),
    }
}

pub fn write_blob<T: Serialize>(properties: &mut Map<String, Value>, key: &str, blob: &T) {
    match serde_json::to_value(blob) {
        Ok(value) => {
            properties.insert(key.to_string(), value);
        }
        Err(e) => tracing::warn!(key, error = %e, "Failed to encode node blob"),
    }
}

/// The three backend-facing fields. Never rendered; recomputed on every value,
/// connection or mapping change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HiddenValueStore {
    pub model_id: String,
    pub request_json: String,
    pub param_map: String,
}

impl HiddenValueStore {
    pub fn compute(state: &NodeDynamicState, is_wired: impl Fn(&str) -> bool) -> Self {
        if !state.has_model() {
            return Self::default();
        }
        let request = state.request_values(is_wired);
        Self {
            model_id: state.model_id.clone().unwrap_or_default(),
            request_json: Value::Object(request).to_string(),
            param_map: state.mapping().to_json(),
        }
    }

    /// Widget values in the order of [`HIDDEN_FIELDS`].
    pub fn widget_values(&self) -> Vec<Value> {
        vec![
            Value::String(self.model_id.clone()),
            Value::String(self.request_json.clone()),
            Value::String(self.param_map.clone()),
        ]
    }

    /// Reads the fields back from saved widget values in static order.
    pub fn from_widget_values(values: &[Value]) -> Option<Self> {
        let [model_id, request_json, param_map] = values else {
            return None;
        };
        Some(Self {
            model_id: model_id.as_str()?.to_string(),
            request_json: request_json.as_str()?.to_string(),
            param_map: param_map.as_str()?.to_string(),
        })
    }
}
