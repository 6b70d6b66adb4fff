use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::diff::FieldOp;
use crate::diff::MapDiff;
use crate::diff::MapKeyOp;
use crate::diff::MessageDiff;
use crate::diff::RepeatedDiff;
use crate::diff::Scalar;
use crate::diff::SingularValue;
use crate::schema::FieldDescriptor;
use crate::schema::FieldKind;
use crate::schema::MessageSchema;
use crate::schema::SchemaRegistry;
use crate::value::MapValue;
use crate::value::Record;
use crate::value::Value;

/// Something the applier could not apply exactly. None of these stop the
/// rest of the diff from being applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiffWarning {
    #[error("unknown field {number} in {schema}; skipped")]
    UnknownField { schema: String, number: u32 },
    #[error("{schema}.{field}: {op} does not fit a {kind:?} field; skipped")]
    KindMismatch {
        schema: String,
        field: String,
        op: &'static str,
        kind: FieldKind,
    },
    #[error("{schema}.{field}: {indices} indices for {values} values; applied the aligned prefix")]
    MalformedRepeated {
        schema: String,
        field: String,
        indices: usize,
        values: usize,
    },
    #[error("{schema}.{field}: update index {index} is past length {len}; skipped")]
    IndexOutOfRange {
        schema: String,
        field: String,
        index: usize,
        len: usize,
    },
    #[error("{schema}.{field}: map key cannot be a float or bytes value; skipped")]
    InvalidMapKey { schema: String, field: String },
    #[error("{schema}.{field}: {value} exceeds the exact integer range")]
    PrecisionLoss {
        schema: String,
        field: String,
        value: String,
    },
    #[error("{schema}.{field}: element schema {element} is not registered")]
    UnknownSchema {
        schema: String,
        field: String,
        element: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub fields_applied: usize,
    pub warnings: Vec<DiffWarning>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, warning: DiffWarning) {
        warn!(%warning, "diff degraded");
        self.warnings.push(warning);
    }
}

/// Schema-driven, in-place patcher for [`Record`] trees.
///
/// Existing nested records are mutated rather than rebuilt, so unchanged
/// substructure is untouched by a diff that does not name it.
#[derive(Debug, Clone, Copy)]
pub struct DiffApplier<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> DiffApplier<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn apply(&self, target: &mut Record, diff: &MessageDiff, schema: &MessageSchema) -> ApplyReport {
        let mut report = ApplyReport::default();
        self.apply_message(target, diff, schema, &mut report);
        report
    }

    pub fn apply_root(&self, target: &mut Record, diff: &MessageDiff) -> ApplyReport {
        self.apply(target, diff, self.registry.root())
    }

    fn apply_message(
        &self,
        target: &mut Record,
        diff: &MessageDiff,
        schema: &MessageSchema,
        report: &mut ApplyReport,
    ) {
        for field_diff in &diff.field_diffs {
            let Some(field) = schema.field(field_diff.field_number) else {
                report.warn(DiffWarning::UnknownField {
                    schema: schema.name().to_string(),
                    number: field_diff.field_number,
                });
                continue;
            };

            let applied = match &field_diff.op {
                FieldOp::SetScalar(scalar) => self.set_scalar(target, schema, field, scalar, report),
                FieldOp::SetMessage(nested) => {
                    self.set_message(target, schema, field, nested, report)
                }
                FieldOp::Clear(explicit) => {
                    if *explicit {
                        clear_field(target, field);
                    }
                    true
                }
                FieldOp::SetRepeated(repeated) => {
                    self.set_repeated(target, schema, field, repeated, report)
                }
                FieldOp::SetMap(map) => self.set_map(target, schema, field, map, report),
            };
            if applied {
                report.fields_applied += 1;
            }
        }
    }

    fn set_scalar(
        &self,
        target: &mut Record,
        schema: &MessageSchema,
        field: &FieldDescriptor,
        scalar: &Scalar,
        report: &mut ApplyReport,
    ) -> bool {
        if field.kind != FieldKind::Scalar || field.repeated {
            report.warn(kind_mismatch(schema, field, "set_scalar"));
            return false;
        }
        let value = self.scalar_value(schema, field, scalar, report);
        match field.oneof_group.as_deref() {
            Some(group) => target.set_case(group, &field.local_name, value),
            None => target.set(&field.local_name, value),
        }
        true
    }

    fn set_message(
        &self,
        target: &mut Record,
        schema: &MessageSchema,
        field: &FieldDescriptor,
        nested: &MessageDiff,
        report: &mut ApplyReport,
    ) -> bool {
        if field.kind != FieldKind::Message || field.repeated {
            report.warn(kind_mismatch(schema, field, "set_message"));
            return false;
        }
        let Some(nested_schema) = self.element_schema(schema, field, report) else {
            return false;
        };
        let slot = match field.oneof_group.as_deref() {
            Some(group) => target.case_slot(group, &field.local_name),
            None => target.field_slot(&field.local_name),
        };
        let record = record_slot(slot);
        self.apply_message(record, nested, nested_schema, report);
        true
    }

    fn set_repeated(
        &self,
        target: &mut Record,
        schema: &MessageSchema,
        field: &FieldDescriptor,
        diff: &RepeatedDiff,
        report: &mut ApplyReport,
    ) -> bool {
        if !field.repeated || field.kind == FieldKind::Map {
            report.warn(kind_mismatch(schema, field, "set_repeated"));
            return false;
        }
        let slot = target.field_slot(&field.local_name);
        if !matches!(slot, Value::List(_)) {
            *slot = Value::List(Vec::new());
        }
        let Value::List(items) = slot else {
            return false;
        };

        if let Some(new_length) = diff.new_length {
            let new_length = new_length as usize;
            if new_length < items.len() {
                items.truncate(new_length);
            } else {
                items.resize_with(new_length, || placeholder(field));
            }
        }

        if diff.update_indices.len() != diff.update_values.len() {
            report.warn(DiffWarning::MalformedRepeated {
                schema: schema.name().to_string(),
                field: field.local_name.clone(),
                indices: diff.update_indices.len(),
                values: diff.update_values.len(),
            });
        }
        for (index, value) in diff.update_indices.iter().zip(&diff.update_values) {
            let index = *index as usize;
            // An index equal to the length appends; growth stays bounded by the
            // number of pairs in the diff.
            if index > items.len() {
                report.warn(DiffWarning::IndexOutOfRange {
                    schema: schema.name().to_string(),
                    field: field.local_name.clone(),
                    index,
                    len: items.len(),
                });
                continue;
            }
            if index == items.len() {
                debug!(
                    schema = schema.name(),
                    field = %field.local_name,
                    index,
                    "repeated update at current length; appending"
                );
                items.push(placeholder(field));
            }
            self.write_singular(&mut items[index], schema, field, value, report);
        }
        true
    }

    fn set_map(
        &self,
        target: &mut Record,
        schema: &MessageSchema,
        field: &FieldDescriptor,
        diff: &MapDiff,
        report: &mut ApplyReport,
    ) -> bool {
        if field.kind != FieldKind::Map {
            report.warn(kind_mismatch(schema, field, "set_map"));
            return false;
        }
        let slot = target.field_slot(&field.local_name);
        if !matches!(slot, Value::Map(_)) {
            *slot = Value::Map(MapValue::new());
        }
        let Value::Map(map) = slot else {
            return false;
        };

        for key_diff in &diff.map_key_diffs {
            let Some(key) = key_diff.map_key.to_map_key() else {
                report.warn(DiffWarning::InvalidMapKey {
                    schema: schema.name().to_string(),
                    field: field.local_name.clone(),
                });
                continue;
            };
            match &key_diff.op {
                MapKeyOp::Set(value) => match map.get_mut(&key) {
                    Some(existing) => {
                        self.write_singular(existing, schema, field, value, report);
                    }
                    None => {
                        let mut fresh = Value::Null;
                        if self.write_singular(&mut fresh, schema, field, value, report) {
                            map.insert(key, fresh);
                        }
                    }
                },
                MapKeyOp::Clear(true) => {
                    map.remove(&key);
                }
                MapKeyOp::Clear(false) => {}
            }
        }
        true
    }

    /// Writes one repeated element or map value. Message values merge into an
    /// existing record in the slot; scalars replace. Returns false when the
    /// slot was left untouched.
    fn write_singular(
        &self,
        slot: &mut Value,
        schema: &MessageSchema,
        field: &FieldDescriptor,
        value: &SingularValue,
        report: &mut ApplyReport,
    ) -> bool {
        match value {
            SingularValue::Scalar(scalar) => {
                *slot = self.scalar_value(schema, field, scalar, report);
                true
            }
            SingularValue::Message(nested) => {
                let Some(nested_schema) = self.element_schema(schema, field, report) else {
                    return false;
                };
                self.apply_message(record_slot(slot), nested, nested_schema, report);
                true
            }
        }
    }

    fn scalar_value(
        &self,
        schema: &MessageSchema,
        field: &FieldDescriptor,
        scalar: &Scalar,
        report: &mut ApplyReport,
    ) -> Value {
        if scalar.exceeds_safe_integer() {
            report.warn(DiffWarning::PrecisionLoss {
                schema: schema.name().to_string(),
                field: field.local_name.clone(),
                value: format!("{scalar:?}"),
            });
        }
        scalar.to_value()
    }

    fn element_schema(
        &self,
        schema: &MessageSchema,
        field: &FieldDescriptor,
        report: &mut ApplyReport,
    ) -> Option<&'a MessageSchema> {
        let Some(element) = field.element_schema.as_deref() else {
            report.warn(kind_mismatch(schema, field, "message value"));
            return None;
        };
        let resolved = self.registry.get(element);
        if resolved.is_none() {
            report.warn(DiffWarning::UnknownSchema {
                schema: schema.name().to_string(),
                field: field.local_name.clone(),
                element: element.to_string(),
            });
        }
        resolved
    }
}

fn clear_field(target: &mut Record, field: &FieldDescriptor) {
    match field.oneof_group.as_deref() {
        Some(group) => {
            if target.active_case(group) == Some(field.local_name.as_str()) {
                target.clear_group(group);
            }
        }
        None => {
            target.remove(&field.local_name);
        }
    }
}

fn record_slot(slot: &mut Value) -> &mut Record {
    if !matches!(slot, Value::Message(_)) {
        *slot = Value::Message(Record::new());
    }
    match slot {
        Value::Message(record) => record,
        _ => unreachable!("slot was just set to a message"),
    }
}

fn placeholder(field: &FieldDescriptor) -> Value {
    if field.holds_records() {
        Value::Message(Record::new())
    } else {
        Value::Null
    }
}

fn kind_mismatch(schema: &MessageSchema, field: &FieldDescriptor, op: &'static str) -> DiffWarning {
    DiffWarning::KindMismatch {
        schema: schema.name().to_string(),
        field: field.local_name.clone(),
        op,
        kind: field.kind,
    }
}

#[cfg(test)]
mod tests;
