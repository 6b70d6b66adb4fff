use serde::Deserialize;
use serde::Serialize;

use crate::schema::FieldKind;
use crate::schema::MessageSchema;
use crate::schema::SchemaRegistry;
use crate::value::MapKey;
use crate::value::Record;
use crate::value::Value;
use crate::value::MAX_SAFE_INTEGER;

/// Structural partial update for one record, keyed by field number.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageDiff {
    #[serde(default)]
    pub field_diffs: Vec<FieldDiff>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field_number: u32,
    #[serde(flatten)]
    pub op: FieldOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOp {
    SetScalar(Scalar),
    SetMessage(MessageDiff),
    /// Only `true` clears; `false` marks the field as untouched.
    Clear(bool),
    SetRepeated(RepeatedDiff),
    SetMap(MapDiff),
}

/// Wire-level scalar. Every integer width is kept distinct here and collapsed
/// to one numeric representation when written into a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Sint32(i32),
    Sint64(i64),
    Fixed32(u32),
    Fixed64(u64),
    Sfixed32(i32),
    Sfixed64(i64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
}

impl Scalar {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Double(value) => Value::Number(*value),
            Self::Float(value) => Value::Number(f64::from(*value)),
            Self::Int32(value) | Self::Sint32(value) | Self::Sfixed32(value) | Self::Enum(value) => {
                Value::Number(f64::from(*value))
            }
            Self::Uint32(value) | Self::Fixed32(value) => Value::Number(f64::from(*value)),
            Self::Int64(value) | Self::Sint64(value) | Self::Sfixed64(value) => {
                Value::Number(*value as f64)
            }
            Self::Uint64(value) | Self::Fixed64(value) => Value::Number(*value as f64),
            Self::Bool(value) => Value::Bool(*value),
            Self::String(value) => Value::String(value.clone()),
            Self::Bytes(value) => Value::Bytes(value.clone()),
        }
    }

    /// True for 64-bit integers that `to_value` cannot represent exactly.
    pub fn exceeds_safe_integer(&self) -> bool {
        match self {
            Self::Int64(value) | Self::Sint64(value) | Self::Sfixed64(value) => {
                value.unsigned_abs() > MAX_SAFE_INTEGER
            }
            Self::Uint64(value) | Self::Fixed64(value) => *value > MAX_SAFE_INTEGER,
            _ => false,
        }
    }

    pub fn to_map_key(&self) -> Option<MapKey> {
        match self {
            Self::Int32(value) | Self::Sint32(value) | Self::Sfixed32(value) | Self::Enum(value) => {
                Some(MapKey::Int(i64::from(*value)))
            }
            Self::Int64(value) | Self::Sint64(value) | Self::Sfixed64(value) => {
                Some(MapKey::Int(*value))
            }
            Self::Uint32(value) | Self::Fixed32(value) => Some(MapKey::Uint(u64::from(*value))),
            Self::Uint64(value) | Self::Fixed64(value) => Some(MapKey::Uint(*value)),
            Self::Bool(value) => Some(MapKey::Bool(*value)),
            Self::String(value) => Some(MapKey::String(value.clone())),
            Self::Double(_) | Self::Float(_) | Self::Bytes(_) => None,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }
}

impl From<&MapKey> for Scalar {
    fn from(key: &MapKey) -> Self {
        match key {
            MapKey::Bool(value) => Self::Bool(*value),
            MapKey::Int(value) => Self::Int64(*value),
            MapKey::Uint(value) => Self::Uint64(*value),
            MapKey::String(value) => Self::String(value.clone()),
        }
    }
}

/// A single value inside a repeated or map update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingularValue {
    Scalar(Scalar),
    Message(MessageDiff),
}

/// Resize-then-patch update for a repeated field. `update_indices` and
/// `update_values` are parallel lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RepeatedDiff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_length: Option<u32>,
    #[serde(default)]
    pub update_indices: Vec<u32>,
    #[serde(default)]
    pub update_values: Vec<SingularValue>,
}

impl RepeatedDiff {
    pub fn resize(new_length: u32) -> Self {
        Self {
            new_length: Some(new_length),
            ..Self::default()
        }
    }

    pub fn set(mut self, index: u32, value: SingularValue) -> Self {
        self.update_indices.push(index);
        self.update_values.push(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapDiff {
    #[serde(default)]
    pub map_key_diffs: Vec<MapKeyDiff>,
}

impl MapDiff {
    pub fn set(mut self, key: Scalar, value: SingularValue) -> Self {
        self.map_key_diffs.push(MapKeyDiff {
            map_key: key,
            op: MapKeyOp::Set(value),
        });
        self
    }

    pub fn clear(mut self, key: Scalar) -> Self {
        self.map_key_diffs.push(MapKeyDiff {
            map_key: key,
            op: MapKeyOp::Clear(true),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapKeyDiff {
    pub map_key: Scalar,
    #[serde(flatten)]
    pub op: MapKeyOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKeyOp {
    Set(SingularValue),
    Clear(bool),
}

impl MessageDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.field_diffs.is_empty()
    }

    pub fn push(mut self, field_number: u32, op: FieldOp) -> Self {
        self.field_diffs.push(FieldDiff { field_number, op });
        self
    }

    pub fn scalar(self, field_number: u32, value: Scalar) -> Self {
        self.push(field_number, FieldOp::SetScalar(value))
    }

    pub fn message(self, field_number: u32, diff: MessageDiff) -> Self {
        self.push(field_number, FieldOp::SetMessage(diff))
    }

    pub fn clear(self, field_number: u32) -> Self {
        self.push(field_number, FieldOp::Clear(true))
    }

    pub fn repeated(self, field_number: u32, diff: RepeatedDiff) -> Self {
        self.push(field_number, FieldOp::SetRepeated(diff))
    }

    pub fn map(self, field_number: u32, diff: MapDiff) -> Self {
        self.push(field_number, FieldOp::SetMap(diff))
    }
}

/// Builds a diff that, applied to an empty record, reproduces `record`.
///
/// Fields the schema does not describe are left out; null scalars are left out
/// because padding already yields them.
pub fn full_state_diff(record: &Record, schema: &MessageSchema, registry: &SchemaRegistry) -> MessageDiff {
    let mut diff = MessageDiff::new();
    for field in schema.fields() {
        let Some(value) = record.get(&field.local_name) else {
            continue;
        };
        if let Some(group) = field.oneof_group.as_deref() {
            if record.active_case(group) != Some(field.local_name.as_str()) {
                continue;
            }
        }
        let element_schema = field
            .element_schema
            .as_deref()
            .and_then(|name| registry.get(name));

        let op = match (field.kind, value) {
            (_, Value::List(items)) if field.repeated => {
                let mut repeated = RepeatedDiff::resize(items.len() as u32);
                for (idx, item) in items.iter().enumerate() {
                    if let Some(singular) = singular_for(item, element_schema, registry) {
                        repeated = repeated.set(idx as u32, singular);
                    }
                }
                FieldOp::SetRepeated(repeated)
            }
            (FieldKind::Map, Value::Map(map)) => {
                let mut map_diff = MapDiff::default();
                for (key, item) in map.iter() {
                    if let Some(singular) = singular_for(item, element_schema, registry) {
                        map_diff = map_diff.set(Scalar::from(key), singular);
                    }
                }
                FieldOp::SetMap(map_diff)
            }
            (FieldKind::Message, Value::Message(nested)) => match element_schema {
                Some(nested_schema) => {
                    FieldOp::SetMessage(full_state_diff(nested, nested_schema, registry))
                }
                None => continue,
            },
            (FieldKind::Scalar, scalar) => match scalar_for(scalar) {
                Some(scalar) => FieldOp::SetScalar(scalar),
                None => continue,
            },
            _ => continue,
        };
        diff.field_diffs.push(FieldDiff {
            field_number: field.number,
            op,
        });
    }
    diff
}

fn singular_for(
    value: &Value,
    element_schema: Option<&MessageSchema>,
    registry: &SchemaRegistry,
) -> Option<SingularValue> {
    match (value, element_schema) {
        (Value::Message(record), Some(schema)) => Some(SingularValue::Message(full_state_diff(
            record, schema, registry,
        ))),
        (Value::Message(_), None) => None,
        (other, _) => scalar_for(other).map(SingularValue::Scalar),
    }
}

fn scalar_for(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(value) => Some(Scalar::Bool(*value)),
        Value::Number(value) => {
            if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER as f64 {
                Some(Scalar::Int64(*value as i64))
            } else {
                Some(Scalar::Double(*value))
            }
        }
        Value::String(value) => Some(Scalar::String(value.clone())),
        Value::Bytes(value) => Some(Scalar::Bytes(value.clone())),
        Value::Null | Value::Message(_) | Value::List(_) | Value::Map(_) => None,
    }
}
