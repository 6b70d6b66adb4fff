use serde::Deserialize;
use serde::Serialize;

use crate::approval::ApprovalRequest;
use crate::state::RunStatus;
use crate::state::StepSnapshot;
use crate::state::StepStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Consumer-facing event derived from the projection after a diff.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StepNew {
        step: StepSnapshot,
    },
    StepUpdate {
        step: StepSnapshot,
        previous_status: StepStatus,
    },
    TextDelta {
        delta: String,
        full_text: String,
        step_index: usize,
    },
    ThinkingDelta {
        delta: String,
        full_text: String,
        step_index: usize,
    },
    CommandOutput {
        delta: String,
        full_text: String,
        output_type: OutputStream,
        step_index: usize,
    },
    StatusChange {
        status: RunStatus,
        previous_status: RunStatus,
    },
    ApprovalNeeded(ApprovalRequest),
    /// The run status went idle: one turn is complete.
    Done,
    /// Terminal stream failure. Emitted at most once per subscription.
    Error {
        cause: String,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StepNew { .. } => "step:new",
            Self::StepUpdate { .. } => "step:update",
            Self::TextDelta { .. } => "text:delta",
            Self::ThinkingDelta { .. } => "thinking:delta",
            Self::CommandOutput { .. } => "command_output",
            Self::StatusChange { .. } => "status_change",
            Self::ApprovalNeeded(_) => "approval:needed",
            Self::Done => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::StepNew { step } | Self::StepUpdate { step, .. } => Some(step.index),
            Self::TextDelta { step_index, .. }
            | Self::ThinkingDelta { step_index, .. }
            | Self::CommandOutput { step_index, .. } => Some(*step_index),
            Self::ApprovalNeeded(request) => Some(request.step_index()),
            Self::StatusChange { .. } | Self::Done | Self::Error { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
