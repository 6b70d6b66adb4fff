use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use tether_core::MessageDiff;
use tether_core::Record;
use tether_core::TransportError;

/// One message of the update stream. Keep-alives carry no diff.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<MessageDiff>,
}

impl UpdateMessage {
    pub fn with_diff(diff: MessageDiff) -> Self {
        Self { diff: Some(diff) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub session_id: String,
    /// Fresh for every attempt.
    pub subscriber_id: String,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum StreamError {
    #[error("stream cancelled: {0}")]
    Cancelled(String),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("stream closed abnormally: {0}")]
    Closed(String),
}

impl StreamError {
    /// Terminal errors end the subscription loop instead of backing off.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled(_) | Self::NotFound(_))
    }
}

pub type UpdateStream = BoxStream<'static, Result<UpdateMessage, StreamError>>;

/// The streaming and snapshot calls of the remote session service.
#[async_trait]
pub trait ReactiveTransport: Send + Sync {
    /// Opens one update stream. A stream that ends without an error is a
    /// normal turn boundary, not the end of the session.
    async fn subscribe(&self, request: SubscribeRequest) -> Result<UpdateStream, StreamError>;

    async fn fetch_full_state(&self, session_id: &str) -> Result<Record, TransportError>;
}
