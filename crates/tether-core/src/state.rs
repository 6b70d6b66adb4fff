use serde::Deserialize;
use serde::Serialize;

use crate::applier::ApplyReport;
use crate::applier::DiffApplier;
use crate::diff::MessageDiff;
use crate::schema::SchemaRegistry;
use crate::step_kind::StepCategory;
use crate::step_kind::StepKindRegistry;
use crate::value::OneofValue;
use crate::value::Record;
use crate::value::Value;

static EMPTY_RECORD: Record = Record::empty();

pub const STEP_PAYLOAD_GROUP: &str = "step";
pub const INTERACTION_GROUP: &str = "interaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Unspecified,
    Idle,
    Running,
    Canceling,
    Busy,
    Other(i32),
}

impl RunStatus {
    pub fn from_wire(value: i32) -> Self {
        match value {
            0 => Self::Unspecified,
            1 => Self::Idle,
            2 => Self::Running,
            3 => Self::Canceling,
            4 => Self::Busy,
            other => Self::Other(other),
        }
    }

    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Canceling => "canceling",
            Self::Busy => "busy",
            Self::Other(_) => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Unspecified,
    Generating,
    Queued,
    Pending,
    Running,
    Waiting,
    Done,
    Invalid,
    Cleared,
    Canceled,
    Error,
    Interrupted,
    Other(i32),
}

impl StepStatus {
    pub fn from_wire(value: i32) -> Self {
        match value {
            0 => Self::Unspecified,
            1 => Self::Generating,
            2 => Self::Queued,
            3 => Self::Pending,
            4 => Self::Running,
            5 => Self::Waiting,
            6 => Self::Done,
            7 => Self::Invalid,
            8 => Self::Cleared,
            9 => Self::Canceled,
            10 => Self::Error,
            11 => Self::Interrupted,
            other => Self::Other(other),
        }
    }

    /// Statuses during which a requested interaction can still be answered.
    pub fn awaits_interaction(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Waiting)
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Canceled | Self::Error | Self::Interrupted | Self::Cleared
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Generating => "generating",
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Done => "done",
            Self::Invalid => "invalid",
            Self::Cleared => "cleared",
            Self::Canceled => "canceled",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
            Self::Other(_) => "other",
        }
    }
}

/// A growing text channel of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Text,
    Thinking,
    Stdout,
    Stderr,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Self::Text, Self::Thinking, Self::Stdout, Self::Stderr];

    pub fn index(self) -> usize {
        match self {
            Self::Text => 0,
            Self::Thinking => 1,
            Self::Stdout => 2,
            Self::Stderr => 3,
        }
    }

    fn location(self) -> (&'static str, &'static str) {
        match self {
            Self::Text => ("planner_response", "response"),
            Self::Thinking => ("planner_response", "thinking"),
            Self::Stdout => ("run_command", "stdout"),
            Self::Stderr => ("run_command", "stderr"),
        }
    }
}

/// The reconciled session tree for one subscription.
///
/// Steps are addressed by index; the step list only grows or mutates in place,
/// so an index handed out once keeps naming the same step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateProjection {
    root: Record,
}

impl StateProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(root: Record) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Record {
        &self.root
    }

    pub fn apply(&mut self, registry: &SchemaRegistry, diff: &MessageDiff) -> ApplyReport {
        DiffApplier::new(registry).apply_root(&mut self.root, diff)
    }

    pub fn run_status(&self) -> RunStatus {
        self.root
            .number_field("status")
            .map_or(RunStatus::Unspecified, |value| RunStatus::from_wire(value as i32))
    }

    pub fn trajectory(&self) -> Option<&Record> {
        self.root.record_field("trajectory")
    }

    pub fn trajectory_id(&self) -> Option<&str> {
        self.trajectory()?.str_field("trajectory_id")
    }

    fn step_values(&self) -> &[Value] {
        self.trajectory()
            .and_then(|trajectory| trajectory.list_field("steps"))
            .unwrap_or(&[])
    }

    pub fn step_count(&self) -> usize {
        self.step_values().len()
    }

    pub fn step(&self, index: usize) -> Option<StepView<'_>> {
        self.step_values()
            .get(index)
            .map(|value| StepView::new(index, value))
    }

    pub fn steps(&self) -> impl Iterator<Item = StepView<'_>> {
        self.step_values()
            .iter()
            .enumerate()
            .map(|(index, value)| StepView::new(index, value))
    }
}

/// Where a step's interaction payload was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionSource {
    /// The step's `requested_interaction` oneof.
    Requested,
    /// A `file_permission_request` embedded in the step payload.
    Inline,
}

#[derive(Debug, Clone, Copy)]
pub struct StepInteraction<'a> {
    pub case: &'a str,
    pub body: &'a Record,
    pub source: InteractionSource,
}

/// Read-only typed access to one step of a projection.
#[derive(Debug, Clone, Copy)]
pub struct StepView<'a> {
    index: usize,
    record: &'a Record,
}

impl<'a> StepView<'a> {
    fn new(index: usize, value: &'a Value) -> Self {
        Self {
            index,
            record: value.as_record().unwrap_or(&EMPTY_RECORD),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn record(&self) -> &'a Record {
        self.record
    }

    pub fn status(&self) -> StepStatus {
        self.record
            .number_field("status")
            .map_or(StepStatus::Unspecified, |value| StepStatus::from_wire(value as i32))
    }

    pub fn payload(&self) -> Option<&'a OneofValue> {
        self.record.oneof(STEP_PAYLOAD_GROUP)
    }

    pub fn kind(&self) -> Option<&'a str> {
        self.record.active_case(STEP_PAYLOAD_GROUP)
    }

    pub fn payload_record(&self) -> Option<&'a Record> {
        self.payload().and_then(|payload| payload.value.as_record())
    }

    pub fn category(&self) -> StepCategory {
        self.kind()
            .map_or(StepCategory::Other, StepKindRegistry::category)
    }

    pub fn error(&self) -> Option<&'a str> {
        let direct = self.record.record_field("error");
        let from_payload = || {
            self.record
                .record_field("error_message")
                .and_then(|payload| payload.record_field("error"))
        };
        direct
            .or_else(from_payload)
            .and_then(|error| error.str_field("short_error"))
    }

    /// The pending interaction, if any. A `requested_interaction` case takes
    /// precedence over a file permission request inlined in the payload.
    pub fn interaction(&self) -> Option<StepInteraction<'a>> {
        let requested = self
            .record
            .record_field("requested_interaction")
            .and_then(|interaction| interaction.oneof(INTERACTION_GROUP));
        if let Some(oneof) = requested {
            return Some(StepInteraction {
                case: oneof.case.as_str(),
                body: oneof.value.as_record().unwrap_or(&EMPTY_RECORD),
                source: InteractionSource::Requested,
            });
        }
        self.payload_record()
            .and_then(|payload| payload.record_field("file_permission_request"))
            .map(|body| StepInteraction {
                case: "file_permission",
                body,
                source: InteractionSource::Inline,
            })
    }

    pub fn channel_text(&self, channel: Channel) -> Option<&'a str> {
        let (case, field) = channel.location();
        if self.kind() != Some(case) {
            return None;
        }
        self.payload_record()?.str_field(field)
    }

    pub fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            index: self.index,
            status: self.status(),
            kind: self.kind().map(str::to_string),
            category: self.category(),
            record: self.record.clone(),
        }
    }
}

/// Owned copy of a step at the moment an event was derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub index: usize,
    pub status: StepStatus,
    pub kind: Option<String>,
    pub category: StepCategory,
    pub record: Record,
}

impl StepSnapshot {
    pub fn title(&self) -> &str {
        self.kind
            .as_deref()
            .map_or("Unknown step", StepKindRegistry::title)
    }
}
