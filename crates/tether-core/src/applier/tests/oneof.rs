use super::*;
use pretty_assertions::assert_eq;

#[test]
fn setting_a_case_replaces_the_previous_case() {
    let registry = registry();
    let mut record = Record::new();

    apply(
        &registry,
        &mut record,
        &MessageDiff::new().message(ITEM, item_diff("old", 1)),
    );
    apply(
        &registry,
        &mut record,
        &MessageDiff::new().scalar(TEXT, Scalar::string("now text")),
    );

    let active = record.oneof("content").expect("content group");
    assert_eq!(active.case, "text");
    assert_eq!(*active.value, Value::String("now text".to_string()));
    assert_eq!(record.get("item"), None);
}

#[test]
fn set_message_on_the_active_case_merges() {
    let registry = registry();
    let mut record = Record::new();

    apply(
        &registry,
        &mut record,
        &MessageDiff::new().message(ITEM, item_diff("kept", 1)),
    );
    apply(
        &registry,
        &mut record,
        &MessageDiff::new().message(ITEM, MessageDiff::new().scalar(2, Scalar::Int32(7))),
    );

    assert_eq!(record.get("item"), Some(&item("kept", 7.0)));
}

#[test]
fn set_message_after_a_different_case_starts_empty() {
    let registry = registry();
    let mut record = Record::new();

    apply(
        &registry,
        &mut record,
        &MessageDiff::new().scalar(COUNT, Scalar::Int32(5)),
    );
    apply(
        &registry,
        &mut record,
        &MessageDiff::new().message(ITEM, MessageDiff::new().scalar(1, Scalar::string("fresh"))),
    );

    assert_eq!(record.active_case("content"), Some("item"));
    assert_eq!(
        record.get("item"),
        Some(&Value::Message(
            Record::new().with("name", Value::String("fresh".to_string()))
        ))
    );
}

#[test]
fn clearing_an_inactive_case_keeps_the_active_one() {
    let registry = registry();
    let mut record = Record::new();

    apply(
        &registry,
        &mut record,
        &MessageDiff::new().scalar(TEXT, Scalar::string("live")),
    );
    apply(&registry, &mut record, &MessageDiff::new().clear(COUNT));
    assert_eq!(record.str_field("text"), Some("live"));

    apply(&registry, &mut record, &MessageDiff::new().clear(TEXT));
    assert_eq!(record.oneof("content"), None);
}
