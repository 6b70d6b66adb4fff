use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::approval::InteractionKind;
use crate::events::OutputStream;
use crate::events::SessionEvent;
use crate::state::RunStatus;
use crate::state::StepStatus;
use crate::step_kind::StepCategory;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io: {0}")]
    Io(#[from] std::io::Error),
    #[error("journal encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serialisable form of a [`SessionEvent`]. Approvals keep what was asked,
/// not the capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournaledEvent {
    StepNew {
        step_index: usize,
        status: StepStatus,
        step_kind: Option<String>,
        category: StepCategory,
    },
    StepUpdate {
        step_index: usize,
        status: StepStatus,
        previous_status: StepStatus,
    },
    TextDelta {
        step_index: usize,
        delta: String,
    },
    ThinkingDelta {
        step_index: usize,
        delta: String,
    },
    CommandOutput {
        step_index: usize,
        output_type: OutputStream,
        delta: String,
    },
    StatusChange {
        status: RunStatus,
        previous_status: RunStatus,
    },
    ApprovalNeeded {
        step_index: usize,
        interaction: InteractionKind,
        description: String,
    },
    Done,
    Error {
        cause: String,
    },
}

impl From<&SessionEvent> for JournaledEvent {
    fn from(event: &SessionEvent) -> Self {
        match event {
            SessionEvent::StepNew { step } => Self::StepNew {
                step_index: step.index,
                status: step.status,
                step_kind: step.kind.clone(),
                category: step.category,
            },
            SessionEvent::StepUpdate {
                step,
                previous_status,
            } => Self::StepUpdate {
                step_index: step.index,
                status: step.status,
                previous_status: *previous_status,
            },
            SessionEvent::TextDelta {
                delta, step_index, ..
            } => Self::TextDelta {
                step_index: *step_index,
                delta: delta.clone(),
            },
            SessionEvent::ThinkingDelta {
                delta, step_index, ..
            } => Self::ThinkingDelta {
                step_index: *step_index,
                delta: delta.clone(),
            },
            SessionEvent::CommandOutput {
                delta,
                output_type,
                step_index,
                ..
            } => Self::CommandOutput {
                step_index: *step_index,
                output_type: *output_type,
                delta: delta.clone(),
            },
            SessionEvent::StatusChange {
                status,
                previous_status,
            } => Self::StatusChange {
                status: *status,
                previous_status: *previous_status,
            },
            SessionEvent::ApprovalNeeded(request) => Self::ApprovalNeeded {
                step_index: request.step_index(),
                interaction: request.kind(),
                description: request.description().to_string(),
            },
            SessionEvent::Done => Self::Done,
            SessionEvent::Error { cause } => Self::Error {
                cause: cause.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub seq: u64,
    pub ts_ms: i64,
    pub session_id: String,
    #[serde(flatten)]
    pub event: JournaledEvent,
}

/// Append-only JSONL log of derived events.
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    next_seq: u64,
}

impl EventJournal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let next_seq = load_records(&path)?
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        Ok(Self { path, next_seq })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, session_id: &str, event: &SessionEvent) -> Result<u64, JournalError> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let record = JournalRecord {
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            session_id: session_id.to_string(),
            event: JournaledEvent::from(event),
        };
        let line = serde_json::to_string(&record)?;
        append_line(&self.path, &line)?;
        Ok(seq)
    }

    pub fn load(&self) -> Result<Vec<JournalRecord>, JournalError> {
        load_records(&self.path)
    }

    pub fn load_since(&self, seq_exclusive: u64) -> Result<Vec<JournalRecord>, JournalError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|record| record.seq > seq_exclusive)
            .collect())
    }

    pub fn load_session(&self, session_id: &str) -> Result<Vec<JournalRecord>, JournalError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|record| record.session_id == session_id)
            .collect())
    }
}

fn load_records(path: &Path) -> Result<Vec<JournalRecord>, JournalError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<JournalRecord>(&line) {
            records.push(record);
        }
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::EventJournal;
    use super::JournaledEvent;
    use crate::events::OutputStream;
    use crate::events::SessionEvent;
    use crate::state::RunStatus;
    use pretty_assertions::assert_eq;

    fn output(delta: &str) -> SessionEvent {
        SessionEvent::CommandOutput {
            delta: delta.to_string(),
            full_text: delta.to_string(),
            output_type: OutputStream::Stdout,
            step_index: 2,
        }
    }

    #[test]
    fn sequence_numbers_are_monotonic_and_survive_reopen() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("events.jsonl");
        let mut journal = EventJournal::open(&path).expect("open");
        assert_eq!(journal.append("s1", &output("a")).expect("append"), 1);
        assert_eq!(journal.append("s1", &SessionEvent::Done).expect("append"), 2);
        drop(journal);

        let mut reopened = EventJournal::open(&path).expect("reopen");
        assert_eq!(reopened.append("s2", &output("b")).expect("append"), 3);

        let seqs: Vec<u64> = reopened.load().expect("load").iter().map(|record| record.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn load_filters_by_seq_and_session() {
        let dir = tempdir().expect("tmpdir");
        let mut journal = EventJournal::open(dir.path().join("nested/events.jsonl")).expect("open");
        journal
            .append(
                "s1",
                &SessionEvent::StatusChange {
                    status: RunStatus::Running,
                    previous_status: RunStatus::Unspecified,
                },
            )
            .expect("append");
        journal.append("s2", &output("x")).expect("append");
        journal.append("s1", &SessionEvent::Done).expect("append");

        let since: Vec<JournaledEvent> = journal
            .load_since(1)
            .expect("since")
            .into_iter()
            .map(|record| record.event)
            .collect();
        assert_eq!(
            since,
            vec![
                JournaledEvent::CommandOutput {
                    step_index: 2,
                    output_type: OutputStream::Stdout,
                    delta: "x".to_string(),
                },
                JournaledEvent::Done,
            ]
        );
        assert_eq!(journal.load_session("s1").expect("session").len(), 2);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let dir = tempdir().expect("tmpdir");
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "not json\n\n").expect("seed");
        let mut journal = EventJournal::open(&path).expect("open");
        assert_eq!(journal.append("s1", &SessionEvent::Done).expect("append"), 1);
        assert_eq!(journal.load().expect("load").len(), 1);
    }
}
