pub(super) use std::sync::Arc;

pub(super) use crate::approval::InteractionKind;
pub(super) use crate::approval::InteractionSink;
pub(super) use crate::approval::RecordingSink;
pub(super) use crate::diff::MessageDiff;
pub(super) use crate::diff::RepeatedDiff;
pub(super) use crate::diff::Scalar;
pub(super) use crate::diff::SingularValue;
pub(super) use crate::events::OutputStream;
pub(super) use crate::events::SessionEvent;
pub(super) use crate::schema::SchemaRegistry;
pub(super) use crate::session::SessionMirror;
pub(super) use crate::state::RunStatus;
pub(super) use crate::state::StepStatus;

mod run_status;

// Field numbers of the built-in session schema.
pub(super) const ROOT_STATUS: u32 = 1;
pub(super) const ROOT_TRAJECTORY: u32 = 2;
pub(super) const TRAJECTORY_ID: u32 = 1;
pub(super) const TRAJECTORY_STEPS: u32 = 2;
pub(super) const STEP_STATUS: u32 = 1;
pub(super) const STEP_INTERACTION: u32 = 2;
pub(super) const STEP_RUN_COMMAND: u32 = 10;
pub(super) const STEP_PLANNER: u32 = 11;
pub(super) const STEP_VIEW_FILE: u32 = 12;
pub(super) const RUN_COMMAND_LINE: u32 = 1;
pub(super) const RUN_STDOUT: u32 = 4;
pub(super) const RUN_STDERR: u32 = 5;
pub(super) const PLANNER_RESPONSE: u32 = 1;
pub(super) const PLANNER_THINKING: u32 = 2;
pub(super) const VIEW_FILE_PERMISSION: u32 = 5;
pub(super) const INTERACTION_RUN_COMMAND: u32 = 1;
pub(super) const PERMISSION_PATH: u32 = 1;

pub(super) const PENDING: i32 = 3;
pub(super) const RUNNING: i32 = 4;
pub(super) const WAITING: i32 = 5;
pub(super) const DONE: i32 = 6;

pub(super) fn mirror() -> (SessionMirror, Arc<RecordingSink>) {
    let registry = Arc::new(SchemaRegistry::builtin().expect("builtin schema"));
    let recording = Arc::new(RecordingSink::new());
    let sink: Arc<dyn InteractionSink> = recording.clone();
    (SessionMirror::new("session-1", registry, sink), recording)
}

/// Root diff touching one step of the trajectory.
pub(super) fn step_diff(index: u32, step: MessageDiff) -> MessageDiff {
    MessageDiff::new().message(
        ROOT_TRAJECTORY,
        MessageDiff::new()
            .scalar(TRAJECTORY_ID, Scalar::string("traj-1"))
            .repeated(
                TRAJECTORY_STEPS,
                RepeatedDiff::default().set(index, SingularValue::Message(step)),
            ),
    )
}

pub(super) fn run_status(status: i32) -> MessageDiff {
    MessageDiff::new().scalar(ROOT_STATUS, Scalar::Enum(status))
}

pub(super) fn status(status: i32) -> MessageDiff {
    MessageDiff::new().scalar(STEP_STATUS, Scalar::Enum(status))
}

pub(super) fn command(fields: MessageDiff) -> MessageDiff {
    MessageDiff::new().message(STEP_RUN_COMMAND, fields)
}

pub(super) fn planner(fields: MessageDiff) -> MessageDiff {
    MessageDiff::new().message(STEP_PLANNER, fields)
}

/// Merges the field diffs of `extra` after those of `base`.
pub(super) fn and(mut base: MessageDiff, extra: MessageDiff) -> MessageDiff {
    base.field_diffs.extend(extra.field_diffs);
    base
}

/// One line per event, enough to pin down order and content.
pub(super) fn describe(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            SessionEvent::StepNew { step } => {
                format!("step:new {} {}", step.index, step.status.label())
            }
            SessionEvent::StepUpdate {
                step,
                previous_status,
            } => format!(
                "step:update {} {}->{}",
                step.index,
                previous_status.label(),
                step.status.label()
            ),
            SessionEvent::TextDelta {
                delta, step_index, ..
            } => format!("text:delta {step_index} {delta:?}"),
            SessionEvent::ThinkingDelta {
                delta, step_index, ..
            } => format!("thinking:delta {step_index} {delta:?}"),
            SessionEvent::CommandOutput {
                delta,
                output_type,
                step_index,
                ..
            } => format!("command_output {step_index} {output_type:?} {delta:?}"),
            SessionEvent::StatusChange {
                status,
                previous_status,
            } => format!("status_change {}->{}", previous_status.label(), status.label()),
            SessionEvent::ApprovalNeeded(request) => {
                format!("approval:needed {} {:?}", request.step_index(), request.kind())
            }
            SessionEvent::Done => "done".to_string(),
            SessionEvent::Error { cause } => format!("error {cause}"),
        })
        .collect()
}
