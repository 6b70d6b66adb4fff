use std::collections::HashMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

const BUILTIN_SESSION_SCHEMA: &str = include_str!("../schema/session.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    Message,
    Map,
}

/// Per-field metadata for one record type.
///
/// `element_schema` names the nested record schema for message fields, the
/// element schema for repeated message fields, and the value schema for
/// message-valued maps. Scalar-valued maps leave it unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub number: u32,
    pub local_name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub repeated: bool,
    #[serde(default)]
    pub oneof_group: Option<String>,
    #[serde(default)]
    pub element_schema: Option<String>,
}

impl FieldDescriptor {
    pub fn scalar(number: u32, local_name: &str) -> Self {
        Self {
            number,
            local_name: local_name.to_string(),
            kind: FieldKind::Scalar,
            repeated: false,
            oneof_group: None,
            element_schema: None,
        }
    }

    pub fn message(number: u32, local_name: &str, schema: &str) -> Self {
        Self {
            number,
            local_name: local_name.to_string(),
            kind: FieldKind::Message,
            repeated: false,
            oneof_group: None,
            element_schema: Some(schema.to_string()),
        }
    }

    pub fn map(number: u32, local_name: &str, value_schema: Option<&str>) -> Self {
        Self {
            number,
            local_name: local_name.to_string(),
            kind: FieldKind::Map,
            repeated: false,
            oneof_group: None,
            element_schema: value_schema.map(str::to_string),
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn in_oneof(mut self, group: &str) -> Self {
        self.oneof_group = Some(group.to_string());
        self
    }

    /// True when values stored under this field (or its elements) are records.
    pub fn holds_records(&self) -> bool {
        self.kind != FieldKind::Scalar && self.element_schema.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    name: String,
    fields: Vec<FieldDescriptor>,
    by_number: HashMap<u32, usize>,
}

impl MessageSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        let name = name.into();
        let mut by_number = HashMap::with_capacity(fields.len());
        let mut names = HashSet::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            if by_number.insert(field.number, idx).is_some() {
                return Err(SchemaError::DuplicateFieldNumber {
                    schema: name,
                    number: field.number,
                });
            }
            if !names.insert(field.local_name.as_str()) {
                return Err(SchemaError::DuplicateLocalName {
                    schema: name,
                    local_name: field.local_name.clone(),
                });
            }
            if field.kind == FieldKind::Message && field.element_schema.is_none() {
                return Err(SchemaError::MissingElementSchema {
                    schema: name,
                    local_name: field.local_name.clone(),
                });
            }
            if field.oneof_group.is_some() && (field.repeated || field.kind == FieldKind::Map) {
                return Err(SchemaError::InvalidOneofMember {
                    schema: name,
                    local_name: field.local_name.clone(),
                });
            }
        }
        for group in fields.iter().filter_map(|field| field.oneof_group.as_deref()) {
            if names.contains(group) {
                return Err(SchemaError::OneofNameCollision {
                    schema: name,
                    group: group.to_string(),
                });
            }
        }

        Ok(Self {
            name,
            fields,
            by_number,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|idx| &self.fields[*idx])
    }

    pub fn field_by_name(&self, local_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.local_name == local_name)
    }

    pub fn oneof_cases<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a FieldDescriptor> {
        self.fields
            .iter()
            .filter(move |field| field.oneof_group.as_deref() == Some(group))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema document could not be parsed: {0}")]
    Parse(String),
    #[error("duplicate field number {number} in {schema}")]
    DuplicateFieldNumber { schema: String, number: u32 },
    #[error("duplicate field name {local_name} in {schema}")]
    DuplicateLocalName { schema: String, local_name: String },
    #[error("message field {local_name} in {schema} has no element schema")]
    MissingElementSchema { schema: String, local_name: String },
    #[error("field {local_name} in {schema} cannot be a repeated or map oneof member")]
    InvalidOneofMember { schema: String, local_name: String },
    #[error("oneof group {group} in {schema} collides with a field name")]
    OneofNameCollision { schema: String, group: String },
    #[error("schema {0} is defined more than once")]
    DuplicateSchema(String),
    #[error("{referrer} references unknown schema {name}")]
    UnknownSchema { referrer: String, name: String },
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    root: String,
    schemas: Vec<SchemaEntry>,
}

#[derive(Debug, Deserialize)]
struct SchemaEntry {
    name: String,
    #[serde(default)]
    fields: Vec<FieldDescriptor>,
}

/// Every record type the projection can hold, plus the name of the root type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    root: String,
    schemas: HashMap<String, MessageSchema>,
}

impl SchemaRegistry {
    pub fn new(root: impl Into<String>, schemas: Vec<MessageSchema>) -> Result<Self, SchemaError> {
        let root = root.into();
        let mut by_name = HashMap::with_capacity(schemas.len());
        for schema in schemas {
            let name = schema.name().to_string();
            if by_name.insert(name.clone(), schema).is_some() {
                return Err(SchemaError::DuplicateSchema(name));
            }
        }
        if !by_name.contains_key(&root) {
            return Err(SchemaError::UnknownSchema {
                referrer: "root".to_string(),
                name: root,
            });
        }
        for schema in by_name.values() {
            for field in schema.fields() {
                if let Some(element) = field.element_schema.as_deref() {
                    if !by_name.contains_key(element) {
                        return Err(SchemaError::UnknownSchema {
                            referrer: format!("{}.{}", schema.name(), field.local_name),
                            name: element.to_string(),
                        });
                    }
                }
            }
        }
        Ok(Self {
            root,
            schemas: by_name,
        })
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument =
            serde_yaml::from_str(source).map_err(|err| SchemaError::Parse(err.to_string()))?;
        let schemas = document
            .schemas
            .into_iter()
            .map(|entry| MessageSchema::new(entry.name, entry.fields))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(document.root, schemas)
    }

    /// The session schema shipped with this crate.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_yaml_str(BUILTIN_SESSION_SCHEMA)
    }

    pub fn root(&self) -> &MessageSchema {
        &self.schemas[&self.root]
    }

    pub fn get(&self, name: &str) -> Option<&MessageSchema> {
        self.schemas.get(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
