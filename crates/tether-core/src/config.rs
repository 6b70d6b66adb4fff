use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub journal: JournalConfig,
    /// Schema document to load instead of the built-in session schema.
    pub schema_path: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Fixed pause between a stream ending and the next subscription.
    pub reconnect_delay_ms: u64,
    /// Capacity of the bounded event channel.
    pub event_buffer: usize,
    /// Fetch the full state once before the first subscription.
    pub hydrate_on_start: bool,
    pub protocol_version: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 1000,
            event_buffer: 256,
            hydrate_on_start: false,
            protocol_version: 1,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct JournalConfig {
    pub path: Option<PathBuf>,
}
