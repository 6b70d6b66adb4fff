use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Largest integer an `f64` represents exactly.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
    Message(Record),
    List(Vec<Value>),
    Map(MapValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Message(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(String),
}

impl MapKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Map storage that keeps keys in first-insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    entries: Vec<(MapKey, Value)>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: &MapKey) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Replaces the value in place when the key exists, otherwise appends.
    pub fn insert(&mut self, key: MapKey, value: Value) {
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &MapKey) -> Option<Value> {
        let idx = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter().map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.iter().map(|(key, _)| key)
    }
}

/// The active member of a oneof group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneofValue {
    pub case: String,
    pub value: Box<Value>,
}

/// A dynamic record: plain fields by local name plus one slot per oneof group.
///
/// A oneof group stores exactly one `{case, value}` pair, so setting a case
/// replaces whatever sibling was active before.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    oneofs: BTreeMap<String, OneofValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn empty() -> Self {
        Self {
            fields: BTreeMap::new(),
            oneofs: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.oneofs.is_empty()
    }

    /// Resolves a plain field or the active case of any oneof group.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).or_else(|| {
            self.oneofs
                .values()
                .find(|oneof| oneof.case == name)
                .map(|oneof| oneof.value.as_ref())
        })
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if self.fields.contains_key(name) {
            return self.fields.get_mut(name);
        }
        self.oneofs
            .values_mut()
            .find(|oneof| oneof.case == name)
            .map(|oneof| oneof.value.as_mut())
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn field_slot(&mut self, name: &str) -> &mut Value {
        self.fields.entry(name.to_string()).or_default()
    }

    pub fn oneof(&self, group: &str) -> Option<&OneofValue> {
        self.oneofs.get(group)
    }

    pub fn active_case(&self, group: &str) -> Option<&str> {
        self.oneofs.get(group).map(|oneof| oneof.case.as_str())
    }

    /// Makes `case` the active member of `group`, dropping any sibling.
    pub fn set_case(&mut self, group: &str, case: &str, value: Value) {
        self.oneofs.insert(
            group.to_string(),
            OneofValue {
                case: case.to_string(),
                value: Box::new(value),
            },
        );
    }

    /// Slot for `case` in `group`. The existing value is kept only when `case`
    /// is already the active member.
    pub fn case_slot(&mut self, group: &str, case: &str) -> &mut Value {
        let oneof = self
            .oneofs
            .entry(group.to_string())
            .or_insert_with(|| OneofValue {
                case: case.to_string(),
                value: Box::new(Value::Null),
            });
        if oneof.case != case {
            oneof.case = case.to_string();
            oneof.value = Box::new(Value::Null);
        }
        oneof.value.as_mut()
    }

    pub fn clear_group(&mut self, group: &str) -> Option<OneofValue> {
        self.oneofs.remove(group)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn number_field(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn record_field(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Value::as_record)
    }

    pub fn list_field(&self, name: &str) -> Option<&[Value]> {
        self.get(name).and_then(Value::as_list)
    }

    pub fn map_field(&self, name: &str) -> Option<&MapValue> {
        self.get(name).and_then(Value::as_map)
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_case(mut self, group: &str, case: &str, value: Value) -> Self {
        self.set_case(group, case, value);
        self
    }
}
