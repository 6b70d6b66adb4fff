use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::state::StepInteraction;
use crate::state::StepView;
use crate::value::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    RunCommand,
    FilePermission,
    OpenBrowserUrl,
    BrowserAction,
    SendCommandInput,
    McpTool,
    Other,
}

impl InteractionKind {
    pub fn from_case(case: &str) -> Self {
        match case {
            "run_command" => Self::RunCommand,
            "file_permission" => Self::FilePermission,
            "open_browser_url" => Self::OpenBrowserUrl,
            "browser_action" => Self::BrowserAction,
            "send_command_input" => Self::SendCommandInput,
            "mcp_tool" => Self::McpTool,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalScope {
    #[default]
    Once,
    Conversation,
}

/// Interaction-specific body of an acknowledgement call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionPayload {
    RunCommand {
        confirm: bool,
        proposed_command_line: String,
        submitted_command_line: String,
    },
    FilePermission {
        allow: bool,
        scope: ApprovalScope,
        absolute_path_uri: String,
    },
    OpenBrowserUrl {
        confirm: bool,
    },
    BrowserAction {
        confirm: bool,
    },
    SendCommandInput {
        confirm: bool,
    },
    McpTool {
        confirm: bool,
    },
    Other {
        case: String,
        confirm: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionAck {
    pub session_id: String,
    pub trajectory_id: String,
    pub step_index: usize,
    pub payload: InteractionPayload,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("session {0} not found")]
    NotFound(String),
    #[error("step {step_index} has no trajectory to acknowledge against")]
    MissingTrajectory { step_index: usize },
}

/// Outbound side of approvals: the acknowledgement call of the transport.
#[async_trait]
pub trait InteractionSink: Send + Sync {
    async fn acknowledge(&self, ack: InteractionAck) -> Result<(), TransportError>;
}

/// Sink that keeps every acknowledgement in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    acks: Mutex<Vec<InteractionAck>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acks(&self) -> Vec<InteractionAck> {
        self.acks
            .lock()
            .map(|acks| acks.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InteractionSink for RecordingSink {
    async fn acknowledge(&self, ack: InteractionAck) -> Result<(), TransportError> {
        let mut acks = self
            .acks
            .lock()
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        acks.push(ack);
        Ok(())
    }
}

/// The session's current trajectory id, shared by every request built from it
/// so an id that arrives after the approval event is still used.
#[derive(Debug, Clone, Default)]
pub struct TrajectoryCell(Arc<Mutex<Option<String>>>);

impl TrajectoryCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, trajectory_id: Option<&str>) {
        if let Ok(mut slot) = self.0.lock() {
            if slot.as_deref() != trajectory_id {
                *slot = trajectory_id.map(str::to_string);
            }
        }
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Capability handed to consumers for one pending interaction.
#[derive(Clone)]
pub struct ApprovalRequest {
    kind: InteractionKind,
    case: String,
    description: String,
    step_index: usize,
    session_id: String,
    trajectory: TrajectoryCell,
    template: InteractionPayload,
    sink: Arc<dyn InteractionSink>,
}

impl ApprovalRequest {
    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    /// The interaction case name as received.
    pub fn case(&self) -> &str {
        &self.case
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The acknowledgement `approve` would send, against the trajectory id
    /// known at call time. Only file permissions carry the scope.
    pub fn acknowledgement(&self, scope: Option<ApprovalScope>) -> Result<InteractionAck, TransportError> {
        let trajectory_id = self
            .trajectory
            .get()
            .ok_or(TransportError::MissingTrajectory {
                step_index: self.step_index,
            })?;
        let mut payload = self.template.clone();
        if let InteractionPayload::FilePermission { scope: slot, .. } = &mut payload {
            *slot = scope.unwrap_or_default();
        }
        Ok(InteractionAck {
            session_id: self.session_id.clone(),
            trajectory_id,
            step_index: self.step_index,
            payload,
        })
    }

    pub async fn approve(&self, scope: Option<ApprovalScope>) -> Result<(), TransportError> {
        let ack = self.acknowledgement(scope)?;
        info!(
            session_id = %self.session_id,
            step_index = self.step_index,
            kind = ?self.kind,
            "approving interaction"
        );
        self.sink.acknowledge(ack).await
    }

    /// Lets the request lapse. The server has no rejection message, so nothing
    /// is sent.
    pub fn deny(&self) {
        debug!(
            session_id = %self.session_id,
            step_index = self.step_index,
            kind = ?self.kind,
            "interaction denied; no acknowledgement sent"
        );
    }
}

impl std::fmt::Debug for ApprovalRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRequest")
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("step_index", &self.step_index)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Turns an eligible step's interaction into an [`ApprovalRequest`].
pub struct ApprovalRequestBuilder<'a> {
    session_id: &'a str,
    trajectory: &'a TrajectoryCell,
    sink: &'a Arc<dyn InteractionSink>,
}

impl<'a> ApprovalRequestBuilder<'a> {
    pub fn new(
        session_id: &'a str,
        trajectory: &'a TrajectoryCell,
        sink: &'a Arc<dyn InteractionSink>,
    ) -> Self {
        Self {
            session_id,
            trajectory,
            sink,
        }
    }

    pub fn build(&self, step: &StepView<'_>, interaction: StepInteraction<'_>) -> ApprovalRequest {
        let kind = InteractionKind::from_case(interaction.case);
        let body = interaction.body;
        let payload = step.payload_record();
        let (description, template) = match kind {
            InteractionKind::RunCommand => {
                let command = payload
                    .and_then(|run| {
                        non_empty(run, "proposed_command_line").or_else(|| non_empty(run, "command_line"))
                    })
                    .unwrap_or_default()
                    .to_string();
                let description = match non_empty(body, "reason") {
                    Some(reason) => format!("Run command: {command} ({reason})"),
                    None => format!("Run command: {command}"),
                };
                (
                    description,
                    InteractionPayload::RunCommand {
                        confirm: true,
                        proposed_command_line: command.clone(),
                        submitted_command_line: command,
                    },
                )
            }
            InteractionKind::FilePermission => {
                let path = body.str_field("absolute_path_uri").unwrap_or_default().to_string();
                let target = if body.bool_field("is_directory").unwrap_or(false) {
                    "directory"
                } else {
                    "file"
                };
                let operation = non_empty(body, "operation").unwrap_or("access");
                (
                    format!("Allow {operation} on {target} {path}"),
                    InteractionPayload::FilePermission {
                        allow: true,
                        scope: ApprovalScope::Once,
                        absolute_path_uri: path,
                    },
                )
            }
            InteractionKind::OpenBrowserUrl => {
                let url = first_of(body, payload, "url").unwrap_or_default();
                (
                    format!("Open browser URL: {url}"),
                    InteractionPayload::OpenBrowserUrl { confirm: true },
                )
            }
            InteractionKind::BrowserAction => {
                let action = first_of(body, payload, "description")
                    .or_else(|| payload.and_then(|payload| non_empty(payload, "action")))
                    .unwrap_or("browser action");
                (
                    format!("Browser action: {action}"),
                    InteractionPayload::BrowserAction { confirm: true },
                )
            }
            InteractionKind::SendCommandInput => {
                let command_id = first_of(body, payload, "command_id").unwrap_or_default();
                (
                    format!("Send input to command {command_id}"),
                    InteractionPayload::SendCommandInput { confirm: true },
                )
            }
            InteractionKind::McpTool => {
                let server = first_of(body, payload, "server_name").unwrap_or("unknown");
                let tool = first_of(body, payload, "tool_name").unwrap_or("unknown");
                (
                    format!("Call MCP tool {server}/{tool}"),
                    InteractionPayload::McpTool { confirm: true },
                )
            }
            InteractionKind::Other => (
                format!("Approve {}", interaction.case),
                InteractionPayload::Other {
                    case: interaction.case.to_string(),
                    confirm: true,
                },
            ),
        };

        ApprovalRequest {
            kind,
            case: interaction.case.to_string(),
            description,
            step_index: step.index(),
            session_id: self.session_id.to_string(),
            trajectory: self.trajectory.clone(),
            template,
            sink: Arc::clone(self.sink),
        }
    }
}

fn non_empty<'r>(record: &'r Record, field: &str) -> Option<&'r str> {
    record.str_field(field).filter(|value| !value.is_empty())
}

fn first_of<'r>(body: &'r Record, payload: Option<&'r Record>, field: &str) -> Option<&'r str> {
    non_empty(body, field).or_else(|| payload.and_then(|payload| non_empty(payload, field)))
}
