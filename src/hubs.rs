//! Hub endpoint resolution.
//!
//! The subscriber never discovers hubs itself; callers tell it which hub
//! serves which topic.

use parking_lot::RwLock;
use std::collections::HashMap;
use url::Url;

/// Maps a topic to the hub endpoint that accepts subscriptions for it.
pub trait HubDirectory: Send + Sync + 'static {
    fn hub_for(&self, topic: &Url) -> Option<Url>;
}

/// Fixed topic → hub table, editable at runtime.
#[derive(Debug, Default)]
pub struct StaticHubs {
    hubs: RwLock<HashMap<String, Url>>,
    fallback: Option<Url>,
}

impl StaticHubs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `hub` for every topic without an explicit entry.
    pub fn with_fallback(hub: Url) -> Self {
        Self {
            hubs: RwLock::new(HashMap::new()),
            fallback: Some(hub),
        }
    }

    /// Route `topic` to `hub`, replacing any earlier entry.
    pub fn insert(&self, topic: &Url, hub: Url) {
        self.hubs.write().insert(topic.as_str().to_string(), hub);
    }

    pub fn remove(&self, topic: &Url) -> Option<Url> {
        self.hubs.write().remove(topic.as_str())
    }
}

impl HubDirectory for StaticHubs {
    fn hub_for(&self, topic: &Url) -> Option<Url> {
        self.hubs
            .read()
            .get(topic.as_str())
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}

impl<F> HubDirectory for F
where
    F: Fn(&Url) -> Option<Url> + Send + Sync + 'static,
{
    fn hub_for(&self, topic: &Url) -> Option<Url> {
        self(topic)
    }
}
