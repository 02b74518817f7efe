//! Change feed for the subscription registry.

use serde::{Deserialize, Serialize};

/// Configuration for a registry watcher.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Max buffered events before the watcher is dropped.
    /// Default: 256
    pub buffer_size: usize,

    /// Only report these topics (None = all topics).
    pub topics: Option<Vec<String>>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            topics: None,
        }
    }
}

impl WatchConfig {
    /// Watch a fixed set of topics.
    pub fn topics(topics: Vec<String>) -> Self {
        Self {
            topics: Some(topics),
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, topic: &str) -> bool {
        match &self.topics {
            Some(topics) => topics.iter().any(|t| t == topic),
            None => true,
        }
    }
}

/// Events emitted when records change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A pending record was stored.
    Registered {
        topic: String,
        /// True if an earlier record for the topic was replaced.
        superseded: bool,
    },

    /// The hub verified the subscription.
    Confirmed { topic: String, lease_seconds: u64 },

    /// The hub refused the subscription.
    Denied {
        topic: String,
        reason: Option<String>,
    },

    /// The lease ran out.
    Expired { topic: String },

    /// The record was removed from the registry.
    Removed { topic: String },

    /// The watcher itself was dropped.
    Dropped { reason: DropReason },
}

impl RegistryEvent {
    pub fn topic(&self) -> Option<&str> {
        match self {
            RegistryEvent::Registered { topic, .. }
            | RegistryEvent::Confirmed { topic, .. }
            | RegistryEvent::Denied { topic, .. }
            | RegistryEvent::Expired { topic }
            | RegistryEvent::Removed { topic } => Some(topic),
            RegistryEvent::Dropped { .. } => None,
        }
    }
}

/// Why a watcher was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unwatched.
    Unwatched,
}

/// Unique identifier for a watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Handle to receive registry events.
pub struct WatchHandle {
    pub id: WatchId,
    pub receiver: crossbeam_channel::Receiver<RegistryEvent>,
}

impl WatchHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<RegistryEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<RegistryEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<RegistryEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
