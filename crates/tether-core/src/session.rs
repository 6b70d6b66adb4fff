use std::sync::Arc;

use tracing::debug;

use crate::applier::ApplyReport;
use crate::approval::InteractionSink;
use crate::deriver::EventDeriver;
use crate::deriver::TrackingState;
use crate::diff::full_state_diff;
use crate::diff::MessageDiff;
use crate::events::SessionEvent;
use crate::schema::SchemaRegistry;
use crate::state::StateProjection;
use crate::value::Record;

/// Projection plus tracking state for one session.
///
/// Every update goes through [`SessionMirror::apply_update`], which applies the
/// diff and derives events before returning, so two diffs never interleave.
pub struct SessionMirror {
    session_id: String,
    registry: Arc<SchemaRegistry>,
    projection: StateProjection,
    deriver: EventDeriver,
}

impl SessionMirror {
    pub fn new(
        session_id: impl Into<String>,
        registry: Arc<SchemaRegistry>,
        sink: Arc<dyn InteractionSink>,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            deriver: EventDeriver::new(session_id.clone(), sink),
            session_id,
            registry,
            projection: StateProjection::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn projection(&self) -> &StateProjection {
        &self.projection
    }

    pub fn tracking(&self) -> &TrackingState {
        self.deriver.tracking()
    }

    pub fn apply_update(&mut self, diff: &MessageDiff) -> (ApplyReport, Vec<SessionEvent>) {
        let report = self.projection.apply(&self.registry, diff);
        let events = self.deriver.derive(&self.projection);
        debug!(
            session_id = %self.session_id,
            fields = report.fields_applied,
            warnings = report.warnings.len(),
            events = events.len(),
            "update applied"
        );
        (report, events)
    }

    /// Applies a full snapshot as a synthetic diff that sets every field.
    pub fn hydrate(&mut self, snapshot: &Record) -> (ApplyReport, Vec<SessionEvent>) {
        let diff = full_state_diff(snapshot, self.registry.root(), &self.registry);
        self.apply_update(&diff)
    }

    pub fn derive(&mut self) -> Vec<SessionEvent> {
        self.deriver.derive(&self.projection)
    }
}

impl std::fmt::Debug for SessionMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMirror")
            .field("session_id", &self.session_id)
            .field("steps", &self.projection.step_count())
            .field("run_status", &self.projection.run_status())
            .finish_non_exhaustive()
    }
}
