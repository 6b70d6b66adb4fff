use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::approval::ApprovalRequestBuilder;
use crate::approval::InteractionSink;
use crate::approval::TrajectoryCell;
use crate::events::OutputStream;
use crate::events::SessionEvent;
use crate::state::Channel;
use crate::state::RunStatus;
use crate::state::StateProjection;
use crate::state::StepStatus;
use crate::state::StepView;

/// Cached view of one tracked step. Lengths are UTF-8 byte lengths indexed by
/// [`Channel::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepTracking {
    pub status: StepStatus,
    pub lengths: [usize; 4],
}

impl StepTracking {
    pub fn length(&self, channel: Channel) -> usize {
        self.lengths[channel.index()]
    }
}

/// What has already been reported for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingState {
    steps: Vec<StepTracking>,
    approvals_emitted: BTreeSet<usize>,
    last_run_status: RunStatus,
}

impl TrackingState {
    pub fn tracked_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&StepTracking> {
        self.steps.get(index)
    }

    pub fn approval_emitted(&self, index: usize) -> bool {
        self.approvals_emitted.contains(&index)
    }

    pub fn last_run_status(&self) -> RunStatus {
        self.last_run_status
    }
}

/// Walks the projection after each diff and reports what changed since the
/// previous walk.
pub struct EventDeriver {
    session_id: String,
    sink: Arc<dyn InteractionSink>,
    trajectory: TrajectoryCell,
    tracking: TrackingState,
}

impl EventDeriver {
    pub fn new(session_id: impl Into<String>, sink: Arc<dyn InteractionSink>) -> Self {
        Self {
            session_id: session_id.into(),
            sink,
            trajectory: TrajectoryCell::new(),
            tracking: TrackingState::default(),
        }
    }

    pub fn tracking(&self) -> &TrackingState {
        &self.tracking
    }

    /// Events in fixed order: run status, step new/update, approvals, then
    /// growth deltas.
    pub fn derive(&mut self, projection: &StateProjection) -> Vec<SessionEvent> {
        self.trajectory.set(projection.trajectory_id());
        let mut events = Vec::new();
        self.derive_run_status(projection, &mut events);
        self.derive_steps(projection, &mut events);
        self.derive_approvals(projection, &mut events);
        self.derive_deltas(projection, &mut events);
        events
    }

    fn derive_run_status(&mut self, projection: &StateProjection, events: &mut Vec<SessionEvent>) {
        let status = projection.run_status();
        let previous = self.tracking.last_run_status;
        if status == previous {
            return;
        }
        self.tracking.last_run_status = status;
        events.push(SessionEvent::StatusChange {
            status,
            previous_status: previous,
        });
        if status.is_idle() {
            events.push(SessionEvent::Done);
        }
    }

    fn derive_steps(&mut self, projection: &StateProjection, events: &mut Vec<SessionEvent>) {
        let count = projection.step_count();
        if count < self.tracking.steps.len() {
            warn!(
                session_id = %self.session_id,
                tracked = self.tracking.steps.len(),
                live = count,
                "step list shrank; dropping tracking for removed steps"
            );
            self.tracking.steps.truncate(count);
            self.tracking.approvals_emitted.retain(|index| *index < count);
        }

        for step in projection.steps() {
            let status = step.status();
            match self.tracking.steps.get_mut(step.index()) {
                Some(tracked) => {
                    if tracked.status != status {
                        let previous_status = tracked.status;
                        tracked.status = status;
                        events.push(SessionEvent::StepUpdate {
                            step: step.snapshot(),
                            previous_status,
                        });
                    }
                }
                None => {
                    self.tracking.steps.push(StepTracking {
                        status,
                        lengths: [0; 4],
                    });
                    events.push(SessionEvent::StepNew {
                        step: step.snapshot(),
                    });
                }
            }
        }
    }

    fn derive_approvals(&mut self, projection: &StateProjection, events: &mut Vec<SessionEvent>) {
        let builder =
            ApprovalRequestBuilder::new(&self.session_id, &self.trajectory, &self.sink);
        for step in projection.steps() {
            if !step.status().awaits_interaction()
                || self.tracking.approvals_emitted.contains(&step.index())
            {
                continue;
            }
            let Some(interaction) = step.interaction() else {
                continue;
            };
            let request = builder.build(&step, interaction);
            self.tracking.approvals_emitted.insert(step.index());
            events.push(SessionEvent::ApprovalNeeded(request));
        }
    }

    fn derive_deltas(&mut self, projection: &StateProjection, events: &mut Vec<SessionEvent>) {
        for step in projection.steps() {
            let Some(tracked) = self.tracking.steps.get_mut(step.index()) else {
                continue;
            };
            for channel in Channel::ALL {
                let Some(current) = step.channel_text(channel) else {
                    continue;
                };
                let slot = &mut tracked.lengths[channel.index()];
                if let Some(delta) = growth(&self.session_id, &step, channel, current, slot) {
                    events.push(delta_event(channel, delta, current, step.index()));
                }
            }
        }
    }
}

/// The appended suffix of `current` past `*last`, advancing `*last`.
fn growth(
    session_id: &str,
    step: &StepView<'_>,
    channel: Channel,
    current: &str,
    last: &mut usize,
) -> Option<String> {
    if current.len() == *last {
        return None;
    }
    if current.len() < *last {
        warn!(
            session_id,
            step_index = step.index(),
            ?channel,
            tracked = *last,
            live = current.len(),
            "channel text shrank; keeping tracked length"
        );
        return None;
    }
    let Some(delta) = current.get(*last..) else {
        warn!(
            session_id,
            step_index = step.index(),
            ?channel,
            tracked = *last,
            "channel text rewritten mid-character; resynchronising"
        );
        *last = current.len();
        return None;
    };
    *last = current.len();
    Some(delta.to_string())
}

fn delta_event(channel: Channel, delta: String, current: &str, step_index: usize) -> SessionEvent {
    let full_text = current.to_string();
    match channel {
        Channel::Text => SessionEvent::TextDelta {
            delta,
            full_text,
            step_index,
        },
        Channel::Thinking => SessionEvent::ThinkingDelta {
            delta,
            full_text,
            step_index,
        },
        Channel::Stdout => SessionEvent::CommandOutput {
            delta,
            full_text,
            output_type: OutputStream::Stdout,
            step_index,
        },
        Channel::Stderr => SessionEvent::CommandOutput {
            delta,
            full_text,
            output_type: OutputStream::Stderr,
            step_index,
        },
    }
}

#[cfg(test)]
mod tests;
