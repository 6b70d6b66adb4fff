pub(super) use super::ApplyReport;
pub(super) use super::DiffApplier;
pub(super) use super::DiffWarning;
pub(super) use crate::diff::MapDiff;
pub(super) use crate::diff::MessageDiff;
pub(super) use crate::diff::RepeatedDiff;
pub(super) use crate::diff::Scalar;
pub(super) use crate::diff::SingularValue;
pub(super) use crate::schema::FieldDescriptor;
pub(super) use crate::schema::MessageSchema;
pub(super) use crate::schema::SchemaRegistry;
pub(super) use crate::value::MapKey;
pub(super) use crate::value::Record;
pub(super) use crate::value::Value;

mod oneof;

const TITLE: u32 = 1;
const BODY: u32 = 2;
const ITEMS: u32 = 3;
const TAGS: u32 = 4;
const ATTRS: u32 = 5;
const CHILDREN: u32 = 6;
const TEXT: u32 = 7;
const ITEM: u32 = 8;
const COUNT: u32 = 9;

fn registry() -> SchemaRegistry {
    let doc = MessageSchema::new(
        "Doc",
        vec![
            FieldDescriptor::scalar(TITLE, "title"),
            FieldDescriptor::message(BODY, "body", "Body"),
            FieldDescriptor::message(ITEMS, "items", "Item").repeated(),
            FieldDescriptor::scalar(TAGS, "tags").repeated(),
            FieldDescriptor::map(ATTRS, "attrs", None),
            FieldDescriptor::map(CHILDREN, "children", Some("Item")),
            FieldDescriptor::scalar(TEXT, "text").in_oneof("content"),
            FieldDescriptor::message(ITEM, "item", "Item").in_oneof("content"),
            FieldDescriptor::scalar(COUNT, "count").in_oneof("content"),
        ],
    )
    .expect("doc schema");
    let body = MessageSchema::new(
        "Body",
        vec![
            FieldDescriptor::scalar(1, "text"),
            FieldDescriptor::message(2, "meta", "Item"),
        ],
    )
    .expect("body schema");
    let item = MessageSchema::new(
        "Item",
        vec![
            FieldDescriptor::scalar(1, "name"),
            FieldDescriptor::scalar(2, "size"),
        ],
    )
    .expect("item schema");
    SchemaRegistry::new("Doc", vec![doc, body, item]).expect("registry")
}

fn apply(registry: &SchemaRegistry, record: &mut Record, diff: &MessageDiff) -> ApplyReport {
    DiffApplier::new(registry).apply_root(record, diff)
}

fn item_diff(name: &str, size: i64) -> MessageDiff {
    MessageDiff::new()
        .scalar(1, Scalar::string(name))
        .scalar(2, Scalar::Int64(size))
}

fn item(name: &str, size: f64) -> Value {
    Value::Message(
        Record::new()
            .with("name", Value::String(name.to_string()))
            .with("size", Value::Number(size)),
    )
}

fn names(record: &Record, field: &str) -> Vec<String> {
    record
        .list_field(field)
        .unwrap_or_default()
        .iter()
        .map(|value| {
            value
                .as_record()
                .and_then(|record| record.str_field("name"))
                .unwrap_or("<placeholder>")
                .to_string()
        })
        .collect()
}
