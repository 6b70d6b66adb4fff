use std::collections::VecDeque;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tether_core::InteractionAck;
use tether_core::InteractionSink;
use tether_core::MessageDiff;
use tether_core::Record;
use tether_core::TransportError;

use crate::transport::ReactiveTransport;
use crate::transport::StreamError;
use crate::transport::SubscribeRequest;
use crate::transport::UpdateMessage;
use crate::transport::UpdateStream;

/// One line of a recorded session trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEntry {
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff: Option<MessageDiff>,
    },
    /// The server closed the stream cleanly.
    EndOfStream,
    /// The stream failed; closes the current segment.
    Error { error: StreamError },
    /// Returned by the full-state fetch. The last snapshot in the trace wins.
    Snapshot { state: Record },
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace io: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub request: SubscribeRequest,
    pub at: Instant,
}

type Segment = Vec<Result<UpdateMessage, StreamError>>;

/// Transport that replays a recorded trace. Each subscription consumes the
/// messages up to and including the next end-of-stream or error marker.
#[derive(Debug)]
pub struct TraceTransport {
    segments: Mutex<VecDeque<Segment>>,
    snapshot: Option<Record>,
    exhausted: CancellationToken,
    subscriptions: Mutex<Vec<SubscriptionRecord>>,
    acks: Mutex<Vec<InteractionAck>>,
}

impl TraceTransport {
    pub fn from_entries(entries: impl IntoIterator<Item = TraceEntry>) -> Self {
        let mut segments = VecDeque::new();
        let mut current: Segment = Vec::new();
        let mut snapshot = None;
        for entry in entries {
            match entry {
                TraceEntry::Update { diff } => current.push(Ok(UpdateMessage { diff })),
                TraceEntry::EndOfStream => segments.push_back(std::mem::take(&mut current)),
                TraceEntry::Error { error } => {
                    current.push(Err(error));
                    segments.push_back(std::mem::take(&mut current));
                }
                TraceEntry::Snapshot { state } => snapshot = Some(state),
            }
        }
        if !current.is_empty() {
            segments.push_back(current);
        }
        Self {
            segments: Mutex::new(segments),
            snapshot,
            exhausted: CancellationToken::new(),
            subscriptions: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
        }
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self, TraceError> {
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str::<TraceEntry>(&line).map_err(|source| TraceError::Parse {
                line: idx + 1,
                source,
            })?;
            entries.push(entry);
        }
        Ok(Self::from_entries(entries))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Cancelled once a subscription finds no recorded segment left.
    pub fn exhausted(&self) -> CancellationToken {
        self.exhausted.clone()
    }

    pub fn remaining_segments(&self) -> usize {
        self.segments.lock().map(|segments| segments.len()).unwrap_or(0)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.subscriptions
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn acks(&self) -> Vec<InteractionAck> {
        self.acks.lock().map(|acks| acks.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReactiveTransport for TraceTransport {
    async fn subscribe(&self, request: SubscribeRequest) -> Result<UpdateStream, StreamError> {
        let segment = {
            let mut segments = self
                .segments
                .lock()
                .map_err(|err| StreamError::Transport(err.to_string()))?;
            segments.pop_front()
        };
        if let Ok(mut records) = self.subscriptions.lock() {
            records.push(SubscriptionRecord {
                request,
                at: Instant::now(),
            });
        }
        match segment {
            Some(segment) => Ok(stream::iter(segment).boxed()),
            None => {
                debug!("trace exhausted; holding the stream open");
                self.exhausted.cancel();
                Ok(stream::pending::<Result<UpdateMessage, StreamError>>().boxed())
            }
        }
    }

    async fn fetch_full_state(&self, session_id: &str) -> Result<Record, TransportError> {
        self.snapshot
            .clone()
            .ok_or_else(|| TransportError::NotFound(session_id.to_string()))
    }
}

#[async_trait]
impl InteractionSink for TraceTransport {
    async fn acknowledge(&self, ack: InteractionAck) -> Result<(), TransportError> {
        let mut acks = self
            .acks
            .lock()
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        acks.push(ack);
        Ok(())
    }
}
