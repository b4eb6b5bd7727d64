//! # Placeholder Pool
//!
//! Every dynamic node statically declares `POOL_CAPACITY` optional inputs
//! (`param_1` ... `param_20`). The pool hands those slots out to schema
//! parameters that need a wire and records the binding in a
//! [`ParameterMapping`], which is what the backend uses to route values.
//!
//! Invariants:
//! - a slot is bound to at most one parameter name;
//! - a parameter name is bound to at most one slot;
//! - the mapping and the per-slot bookkeeping always agree.

use morphport_inspector::{DisplayType, ItemType, ParameterDescriptor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Number of placeholder inputs declared by the node contract.
pub const POOL_CAPACITY: usize = 20;

const SLOT_PREFIX: &str = "param_";

/// One-based placeholder slot number. Serialized as its input name, `param_N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u8);

impl SlotId {
    pub fn new(number: usize) -> Option<Self> {
        (1..=POOL_CAPACITY)
            .contains(&number)
            .then_some(Self(number as u8))
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::new(index + 1)
    }

    /// Parses a placeholder input name.
    pub fn parse(name: &str) -> Option<Self> {
        name.strip_prefix(SLOT_PREFIX)?
            .parse::<usize>()
            .ok()
            .and_then(Self::new)
    }

    pub fn number(self) -> usize {
        self.0 as usize
    }

    /// Zero-based position among the placeholder inputs.
    pub fn index(self) -> usize {
        self.number() - 1
    }

    pub fn all() -> impl Iterator<Item = SlotId> {
        (1..=POOL_CAPACITY as u8).map(SlotId)
    }

    pub fn name(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SLOT_PREFIX}{}", self.0)
    }
}

impl Serialize for SlotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid placeholder '{name}'")))
    }
}

/// The value conversion the backend applies to a routed parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendType {
    String,
    Integer,
    Number,
    Boolean,
    ArrayStr,
    ArrayInt,
}

impl BackendType {
    pub fn for_descriptor(descriptor: &ParameterDescriptor) -> Self {
        if descriptor.is_array {
            return match descriptor.array_item_type {
                Some(item) if item.is_numeric() => Self::ArrayInt,
                _ => Self::ArrayStr,
            };
        }
        match descriptor.display_type {
            DisplayType::Int => Self::Integer,
            DisplayType::Float => Self::Number,
            DisplayType::Boolean => Self::Boolean,
            _ => Self::String,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, Self::ArrayStr | Self::ArrayInt)
    }

    /// Host slot type advertised by a pseudo-port of this type.
    pub fn slot_type(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INT",
            Self::Number => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::ArrayStr | Self::ArrayInt => "*",
        }
    }

    /// Converts an edited or wired value to the shape the backend expects.
    ///
    /// Array types accept a list or comma-separated text; numeric items that do
    /// not parse are kept as strings. Scalars that cannot be converted are
    /// returned unchanged, except for `String` which always yields text.
    pub fn coerce(self, value: &Value) -> Value {
        match self {
            Self::ArrayStr => Value::Array(
                split_items(value)
                    .into_iter()
                    .map(|item| Value::String(text_of(&item)))
                    .collect(),
            ),
            Self::ArrayInt => Value::Array(
                split_items(value)
                    .into_iter()
                    .map(|item| match &item {
                        Value::Number(_) => item,
                        Value::String(s) => parse_number(s).unwrap_or(item),
                        other => Value::String(text_of(other)),
                    })
                    .collect(),
            ),
            Self::Number => match value {
                Value::String(s) => parse_number(s).unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            },
            Self::Integer => match value {
                Value::Number(n) if n.is_f64() => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| Value::from(f as i64))
                    .unwrap_or_else(|| value.clone()),
                Value::String(s) => parse_number(s)
                    .map(|n| self.coerce(&n))
                    .unwrap_or_else(|| value.clone()),
                _ => value.clone(),
            },
            Self::Boolean => match value {
                Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Value::Bool(true),
                Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Value::Bool(false),
                Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
                _ => value.clone(),
            },
            Self::String => Value::String(text_of(value)),
        }
    }
}

fn split_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Value::String(item.to_string()))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Where a parameter is routed and how its value is converted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotBinding {
    pub placeholder: SlotId,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    #[serde(default)]
    pub is_array: bool,
    #[serde(default)]
    pub array_item_type: Option<ItemType>,
}

impl SlotBinding {
    pub fn for_descriptor(placeholder: SlotId, descriptor: &ParameterDescriptor) -> Self {
        Self {
            placeholder,
            backend_type: BackendType::for_descriptor(descriptor),
            is_array: descriptor.is_array,
            array_item_type: descriptor.array_item_type,
        }
    }
}

/// Parameter name to slot binding. Serialized verbatim as the `param_map` field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMapping(BTreeMap<String, SlotBinding>);

impl ParameterMapping {
    pub fn get(&self, name: &str) -> Option<&SlotBinding> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SlotBinding)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The parameter routed through `slot`, if any.
    pub fn parameter_for(&self, slot: SlotId) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, binding)| binding.placeholder == slot)
            .map(|(name, _)| name.as_str())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parses a `param_map` field, accepting both the object form and the
    /// legacy `{"name": "param_N"}` form. Malformed input yields an empty map;
    /// unusable entries are skipped.
    pub fn parse_lenient(raw: &str) -> Self {
        let entries: Map<String, Value> = match serde_json::from_str(raw) {
            Ok(entries) => entries,
            Err(e) => {
                if !raw.trim().is_empty() {
                    tracing::warn!(error = %e, "Ignoring malformed parameter map");
                }
                return Self::default();
            }
        };

        let mut mapping = Self::default();
        for (name, entry) in entries {
            let binding = match entry {
                Value::String(placeholder) => SlotId::parse(&placeholder).map(|slot| SlotBinding {
                    placeholder: slot,
                    backend_type: BackendType::String,
                    is_array: false,
                    array_item_type: None,
                }),
                other => serde_json::from_value::<SlotBinding>(other).ok(),
            };
            match binding {
                Some(binding) => {
                    mapping.0.insert(name, binding);
                }
                None => tracing::debug!(parameter = %name, "Skipping unusable mapping entry"),
            }
        }
        mapping
    }
}

/// One placeholder slot and the parameter it currently carries.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceholderSlot {
    pub slot_id: SlotId,
    pub bound: Option<String>,
}

impl PlaceholderSlot {
    pub fn in_use(&self) -> bool {
        self.bound.is_some()
    }
}

/// Per-node allocator over the fixed set of placeholder slots.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaceholderPool {
    slots: Vec<PlaceholderSlot>,
    mapping: ParameterMapping,
    /// Index the next scan starts from. A hint, not an ordering guarantee.
    next_hint: usize,
}

impl Default for PlaceholderPool {
    fn default() -> Self {
        Self {
            slots: SlotId::all()
                .map(|slot_id| PlaceholderSlot {
                    slot_id,
                    bound: None,
                })
                .collect(),
            mapping: ParameterMapping::default(),
            next_hint: 0,
        }
    }
}

impl PlaceholderPool {
    /// Rebuilds the pool from a persisted mapping.
    ///
    /// Entries that collide on an already bound slot are dropped.
    pub fn from_mapping(mapping: &ParameterMapping) -> Self {
        let mut pool = Self::default();
        for (name, binding) in mapping.iter() {
            let slot = &mut pool.slots[binding.placeholder.index()];
            if let Some(owner) = &slot.bound {
                tracing::warn!(
                    parameter = %name,
                    owner = %owner,
                    slot = %binding.placeholder,
                    "Dropping mapping entry for an already bound slot"
                );
                continue;
            }
            slot.bound = Some(name.clone());
            pool.mapping.0.insert(name.clone(), binding.clone());
        }
        pool.next_hint = pool
            .slots
            .iter()
            .rposition(PlaceholderSlot::in_use)
            .map_or(0, |last| (last + 1) % POOL_CAPACITY);
        pool
    }

    /// Binds `descriptor` to a free slot, or returns its existing binding.
    ///
    /// Scans from the hint, wrapping around. `None` means every slot is bound;
    /// the parameter then stays control-only.
    pub fn allocate(&mut self, descriptor: &ParameterDescriptor) -> Option<SlotBinding> {
        if let Some(existing) = self.mapping.get(&descriptor.name) {
            return Some(existing.clone());
        }

        let free = (0..POOL_CAPACITY)
            .map(|offset| (self.next_hint + offset) % POOL_CAPACITY)
            .find(|&index| !self.slots[index].in_use())?;

        let slot = &mut self.slots[free];
        slot.bound = Some(descriptor.name.clone());
        let binding = SlotBinding::for_descriptor(slot.slot_id, descriptor);
        self.mapping
            .0
            .insert(descriptor.name.clone(), binding.clone());
        self.next_hint = (free + 1) % POOL_CAPACITY;
        Some(binding)
    }

    /// Frees every slot and resets the hint to the first slot.
    pub fn release_all(&mut self) {
        for slot in &mut self.slots {
            slot.bound = None;
        }
        self.mapping.0.clear();
        self.next_hint = 0;
    }

    /// Frees the slots of parameters `keep` rejects. Returns how many were freed.
    pub fn retain_parameters(&mut self, keep: impl Fn(&str) -> bool) -> usize {
        let mut freed = 0;
        for slot in &mut self.slots {
            if slot.bound.as_deref().is_some_and(|name| !keep(name)) {
                slot.bound = None;
                freed += 1;
            }
        }
        self.mapping.0.retain(|name, _| keep(name));
        freed
    }

    pub fn binding(&self, name: &str) -> Option<&SlotBinding> {
        self.mapping.get(name)
    }

    pub fn mapping(&self) -> &ParameterMapping {
        &self.mapping
    }

    pub fn slots(&self) -> &[PlaceholderSlot] {
        &self.slots
    }

    pub fn parameter_for(&self, slot: SlotId) -> Option<&str> {
        self.slots[slot.index()].bound.as_deref()
    }

    pub fn bound_slots(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .filter(|s| s.in_use())
            .map(|s| s.slot_id)
            .collect()
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use()).count()
    }

    pub fn is_exhausted(&self) -> bool {
        self.bound_count() == POOL_CAPACITY
    }

    pub fn next_hint(&self) -> usize {
        self.next_hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(name: &str) -> ParameterDescriptor {
        ParameterDescriptor::new(name, DisplayType::String)
    }

    #[test]
    fn test_slot_id_names() {
        assert_eq!(SlotId::new(1).unwrap().to_string(), "param_1");
        assert_eq!(SlotId::parse("param_20"), SlotId::new(20));
        assert_eq!(SlotId::parse("param_21"), None);
        assert_eq!(SlotId::parse("param_0"), None);
        assert_eq!(SlotId::parse("prompt"), None);
        assert_eq!(SlotId::all().count(), POOL_CAPACITY);
    }

    #[test]
    fn test_allocate_is_idempotent() {
        let mut pool = PlaceholderPool::default();
        let first = pool.allocate(&text("prompt")).unwrap();
        let again = pool.allocate(&text("prompt")).unwrap();
        assert_eq!(first, again);
        assert_eq!(first.placeholder, SlotId::new(1).unwrap());
        assert_eq!(pool.bound_count(), 1);
    }

    #[test]
    fn test_allocation_follows_hint() {
        let mut pool = PlaceholderPool::default();
        let a = pool.allocate(&text("a")).unwrap();
        let b = pool.allocate(&text("b")).unwrap();
        assert_eq!(a.placeholder.number(), 1);
        assert_eq!(b.placeholder.number(), 2);
        assert_eq!(pool.next_hint(), 2);
        assert_eq!(pool.parameter_for(b.placeholder), Some("b"));
        assert_eq!(pool.mapping().parameter_for(a.placeholder), Some("a"));
    }

    #[test]
    fn test_exhaustion_keeps_existing_bindings() {
        let mut pool = PlaceholderPool::default();
        for i in 0..POOL_CAPACITY {
            assert!(pool.allocate(&text(&format!("p{i}"))).is_some());
        }
        let before = pool.mapping().clone();

        assert!(pool.is_exhausted());
        assert_eq!(pool.allocate(&text("extra")), None);
        assert_eq!(pool.mapping(), &before);
        // Existing names still resolve.
        assert_eq!(
            pool.allocate(&text("p3")).unwrap().placeholder.number(),
            4
        );
    }

    #[test]
    fn test_release_all_resets_hint() {
        let mut pool = PlaceholderPool::default();
        pool.allocate(&text("a"));
        pool.allocate(&text("b"));
        pool.allocate(&text("c"));
        pool.release_all();

        assert_eq!(pool.bound_count(), 0);
        assert!(pool.mapping().is_empty());
        assert_eq!(pool.next_hint(), 0);
        assert_eq!(pool.allocate(&text("c")).unwrap().placeholder.number(), 1);
    }

    #[test]
    fn test_retain_parameters_frees_stale_slots() {
        let mut pool = PlaceholderPool::default();
        pool.allocate(&text("a"));
        pool.allocate(&text("b"));

        assert_eq!(pool.retain_parameters(|name| name == "b"), 1);
        assert_eq!(pool.binding("a"), None);
        assert_eq!(pool.bound_slots(), vec![SlotId::new(2).unwrap()]);
    }

    #[test]
    fn test_scan_wraps_around() {
        let mut pool = PlaceholderPool::from_mapping(&ParameterMapping::parse_lenient(
            r#"{"a": "param_2", "z": "param_20"}"#,
        ));
        assert_eq!(pool.next_hint(), 0);
        assert_eq!(pool.allocate(&text("b")).unwrap().placeholder.number(), 1);
        assert_eq!(pool.allocate(&text("c")).unwrap().placeholder.number(), 3);
    }

    #[test]
    fn test_from_mapping_drops_collisions() {
        let mapping = ParameterMapping::parse_lenient(
            r#"{"a": "param_3", "b": {"placeholder": "param_3", "type": "string"}}"#,
        );
        let pool = PlaceholderPool::from_mapping(&mapping);
        assert_eq!(pool.bound_count(), 1);
        assert_eq!(pool.parameter_for(SlotId::new(3).unwrap()), Some("a"));
        assert_eq!(pool.next_hint(), 3);
    }

    #[test]
    fn test_backend_types() {
        let mut images = text("images");
        images.is_array = true;
        images.array_item_type = Some(ItemType::String);
        let mut sizes = text("sizes");
        sizes.is_array = true;
        sizes.array_item_type = Some(ItemType::Integer);

        assert_eq!(BackendType::for_descriptor(&images), BackendType::ArrayStr);
        assert_eq!(BackendType::for_descriptor(&sizes), BackendType::ArrayInt);
        assert_eq!(
            BackendType::for_descriptor(&ParameterDescriptor::new("seed", DisplayType::Int)),
            BackendType::Integer
        );
        assert_eq!(
            BackendType::for_descriptor(&ParameterDescriptor::new("cfg", DisplayType::Float)),
            BackendType::Number
        );
    }

    #[test]
    fn test_mapping_wire_format() {
        let mut pool = PlaceholderPool::default();
        let mut images = text("images");
        images.is_array = true;
        images.array_item_type = Some(ItemType::String);
        pool.allocate(&images);

        let encoded: Value = serde_json::from_str(&pool.mapping().to_json()).unwrap();
        assert_eq!(
            encoded,
            json!({"images": {
                "placeholder": "param_1",
                "type": "array-str",
                "isArray": true,
                "arrayItemType": "string"
            }})
        );
        assert_eq!(
            ParameterMapping::parse_lenient(&encoded.to_string()),
            *pool.mapping()
        );
    }

    #[test]
    fn test_lenient_parse_skips_garbage() {
        assert!(ParameterMapping::parse_lenient("not json").is_empty());
        let mapping = ParameterMapping::parse_lenient(
            r#"{"ok": "param_1", "bad": "param_99", "worse": 7}"#,
        );
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("ok").unwrap().backend_type, BackendType::String);
    }

    #[test]
    fn test_coerce_arrays() {
        assert_eq!(
            BackendType::ArrayStr.coerce(&json!(" a, b ,,c ")),
            json!(["a", "b", "c"])
        );
        assert_eq!(BackendType::ArrayStr.coerce(&json!([1, "x"])), json!(["1", "x"]));
        assert_eq!(
            BackendType::ArrayInt.coerce(&json!("512, 1.5, wide")),
            json!([512, 1.5, "wide"])
        );
        assert_eq!(BackendType::ArrayInt.coerce(&json!(["3", 4])), json!([3, 4]));
        assert_eq!(BackendType::ArrayInt.coerce(&Value::Null), json!([]));
    }

    #[test]
    fn test_coerce_scalars() {
        assert_eq!(BackendType::Number.coerce(&json!("0.5")), json!(0.5));
        assert_eq!(BackendType::Number.coerce(&json!("n/a")), json!("n/a"));
        assert_eq!(BackendType::Integer.coerce(&json!("42")), json!(42));
        assert_eq!(BackendType::Integer.coerce(&json!(8.0)), json!(8));
        assert_eq!(BackendType::Boolean.coerce(&json!("TRUE")), json!(true));
        assert_eq!(BackendType::String.coerce(&json!(5)), json!("5"));
        assert_eq!(BackendType::String.coerce(&Value::Null), json!(""));
    }
}
