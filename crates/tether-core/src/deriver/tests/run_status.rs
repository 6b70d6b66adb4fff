use super::*;
use pretty_assertions::assert_eq;

const IDLE: i32 = 1;
const ACTIVE: i32 = 2;

#[test]
fn going_idle_completes_the_turn() {
    let (mut mirror, _) = mirror();
    let (_, started) = mirror.apply_update(&run_status(ACTIVE));
    let (_, finished) = mirror.apply_update(&run_status(IDLE));

    assert_eq!(describe(&started), vec!["status_change unspecified->running".to_string()]);
    assert_eq!(
        describe(&finished),
        vec!["status_change running->idle".to_string(), "done".to_string()]
    );
    assert_eq!(mirror.tracking().last_run_status(), RunStatus::Idle);
}

#[test]
fn idle_on_first_update_also_completes() {
    let (mut mirror, _) = mirror();
    let (_, events) = mirror.apply_update(&run_status(IDLE));
    assert_eq!(
        describe(&events),
        vec!["status_change unspecified->idle".to_string(), "done".to_string()]
    );
}

#[test]
fn repeated_status_emits_once() {
    let (mut mirror, _) = mirror();
    mirror.apply_update(&run_status(ACTIVE));
    let (_, events) = mirror.apply_update(&run_status(ACTIVE));
    assert!(events.is_empty());
}

#[test]
fn unknown_run_status_is_still_a_change() {
    let (mut mirror, _) = mirror();
    let (_, events) = mirror.apply_update(&run_status(17));
    let SessionEvent::StatusChange { status, .. } = &events[0] else {
        panic!("expected status change, got {events:?}");
    };
    assert_eq!(*status, RunStatus::Other(17));
}

#[test]
fn clearing_status_returns_to_unspecified() {
    let (mut mirror, _) = mirror();
    mirror.apply_update(&run_status(ACTIVE));
    let (_, events) = mirror.apply_update(&MessageDiff::new().clear(ROOT_STATUS));
    assert_eq!(describe(&events), vec!["status_change running->unspecified".to_string()]);
}
