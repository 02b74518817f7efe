//! Registry implementation and change broadcasting.

use crate::error::{Result, SubscriberError};
use crate::token::CallbackToken;
use crate::types::{SubscriptionRecord, SubscriptionState, Timestamp, TransitionFields};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::events::{DropReason, RegistryEvent, WatchConfig, WatchHandle, WatchId};

type Slot = Arc<Mutex<SubscriptionRecord>>;

/// Both lookup directions, always updated under the same write lock.
#[derive(Default)]
struct Index {
    by_topic: HashMap<String, Slot>,
    by_token: HashMap<CallbackToken, String>,
}

impl Index {
    fn slot_for_token(&self, token: &CallbackToken) -> Option<&Slot> {
        self.by_token
            .get(token)
            .and_then(|topic| self.by_topic.get(topic))
    }

    fn remove_topic(&mut self, topic: &str) -> Option<SubscriptionRecord> {
        let slot = self.by_topic.remove(topic)?;
        let record = slot.lock().clone();
        self.by_token.remove(&record.callback_token);
        Some(record)
    }
}

struct Watcher {
    config: WatchConfig,
    sender: Sender<RegistryEvent>,
}

impl Watcher {
    /// Returns false if the buffer is full or the receiver is gone.
    fn try_send(&self, event: RegistryEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Concurrency-safe subscription registry.
pub struct Registry {
    index: RwLock<Index>,
    watchers: RwLock<HashMap<WatchId, Watcher>>,
    next_watch_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
            watchers: RwLock::new(HashMap::new()),
            next_watch_id: AtomicU64::new(1),
        }
    }

    /// Insert the record for its topic, atomically replacing any earlier one.
    ///
    /// The replaced record's token stops resolving in the same critical
    /// section in which the new token starts resolving. Fails if the token
    /// already belongs to a different topic.
    pub fn put(&self, record: SubscriptionRecord) -> Result<Option<SubscriptionRecord>> {
        let topic = record.topic.clone();
        let mut index = self.index.write();

        if let Some(owner) = index.by_token.get(&record.callback_token) {
            if *owner != topic {
                return Err(SubscriberError::Generation(
                    "callback token collides with a live subscription".to_string(),
                ));
            }
        }

        let previous = index.remove_topic(&topic);
        index
            .by_token
            .insert(record.callback_token.clone(), topic.clone());
        index
            .by_topic
            .insert(topic.clone(), Arc::new(Mutex::new(record)));

        // Still under the write lock: no transition on the new token can be
        // announced before its registration.
        debug!(topic = %topic, superseded = previous.is_some(), "Registered subscription");
        self.broadcast(RegistryEvent::Registered {
            topic,
            superseded: previous.is_some(),
        });
        Ok(previous)
    }

    pub fn get_by_topic(&self, topic: &str) -> Option<SubscriptionRecord> {
        let index = self.index.read();
        index.by_topic.get(topic).map(|slot| slot.lock().clone())
    }

    pub fn get_by_token(&self, token: &CallbackToken) -> Option<SubscriptionRecord> {
        let index = self.index.read();
        index.slot_for_token(token).map(|slot| slot.lock().clone())
    }

    /// Compare-and-set state change for the record owning `token`.
    ///
    /// Returns false, leaving the record untouched, if the token no longer
    /// resolves or `new_state` is not reachable from the current state.
    pub fn transition(
        &self,
        token: &CallbackToken,
        new_state: SubscriptionState,
        fields: TransitionFields,
    ) -> bool {
        let index = self.index.read();
        let Some(slot) = index.slot_for_token(token) else {
            return false;
        };
        let mut record = slot.lock();
        if record.callback_token != *token || !record.state.can_transition_to(new_state) {
            return false;
        }
        let event = apply(&mut record, new_state, fields);
        self.broadcast(event);
        true
    }

    /// Mark or unmark the record owning `token` as awaiting unsubscription.
    /// Returns false if the token no longer resolves to a live record.
    pub fn set_unsubscribe_requested(&self, token: &CallbackToken, requested: bool) -> bool {
        let index = self.index.read();
        let Some(slot) = index.slot_for_token(token) else {
            return false;
        };
        let mut record = slot.lock();
        if record.callback_token != *token || !record.state.is_live() {
            return false;
        }
        record.unsubscribe_requested = requested;
        true
    }

    /// Remove the record for `topic`.
    pub fn delete(&self, topic: &str) -> Option<SubscriptionRecord> {
        let mut index = self.index.write();
        let removed = index.remove_topic(topic)?;
        self.broadcast(RegistryEvent::Removed {
            topic: removed.topic.clone(),
        });
        Some(removed)
    }

    /// Remove the record owning `token`, if it still does.
    pub fn remove_by_token(&self, token: &CallbackToken) -> Option<SubscriptionRecord> {
        let mut index = self.index.write();
        let topic = index.by_token.get(token).cloned()?;
        let removed = index.remove_topic(&topic)?;
        self.broadcast(RegistryEvent::Removed {
            topic: removed.topic.clone(),
        });
        Some(removed)
    }

    /// Move every confirmed record whose lease has run out at `now` to
    /// `Expired`. Returns the affected topics.
    pub fn expire_due(&self, now: Timestamp) -> Vec<String> {
        let index = self.index.read();
        index
            .by_topic
            .values()
            .filter_map(|slot| {
                let mut record = slot.lock();
                if !record.lease_elapsed(now) {
                    return None;
                }
                record.state = SubscriptionState::Expired;
                debug!(topic = %record.topic, "Subscription lease expired");
                // Announced while the record is locked, after its Confirmed
                self.broadcast(RegistryEvent::Expired {
                    topic: record.topic.clone(),
                });
                Some(record.topic.clone())
            })
            .collect()
    }

    /// Drop every `Expired` or `Denied` record. Their tokens stop resolving.
    pub fn purge_finished(&self) -> Vec<String> {
        let mut index = self.index.write();
        let finished: Vec<String> = index
            .by_topic
            .iter()
            .filter(|(_, slot)| !slot.lock().state.is_live())
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in &finished {
            index.remove_topic(topic);
            self.broadcast(RegistryEvent::Removed {
                topic: topic.clone(),
            });
        }
        finished
    }

    /// Clones of every record, for callers that persist state themselves.
    pub fn snapshot(&self) -> Vec<SubscriptionRecord> {
        let index = self.index.read();
        index
            .by_topic
            .values()
            .map(|slot| slot.lock().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().by_topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Watchers ---

    /// Start receiving change events.
    pub fn watch(&self, config: WatchConfig) -> WatchHandle {
        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);
        self.watchers.write().insert(id, Watcher { config, sender });
        WatchHandle { id, receiver }
    }

    /// Stop a watcher.
    pub fn unwatch(&self, id: WatchId) {
        if let Some(watcher) = self.watchers.write().remove(&id) {
            let _ = watcher.sender.try_send(RegistryEvent::Dropped {
                reason: DropReason::Unwatched,
            });
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Send to matching watchers; drop those that cannot keep up.
    ///
    /// Callers hold the index lock (and the record's lock for per-record
    /// changes) so events for one topic leave in the order they happened.
    /// Lock order is index, then record, then watchers.
    fn broadcast(&self, event: RegistryEvent) {
        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, watcher) in watchers.iter() {
                let wanted = event.topic().map_or(true, |t| watcher.config.matches(t));
                if wanted && !watcher.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            for id in to_remove {
                if let Some(watcher) = watchers.remove(&id) {
                    let _ = watcher.sender.try_send(RegistryEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(
    record: &mut SubscriptionRecord,
    new_state: SubscriptionState,
    fields: TransitionFields,
) -> RegistryEvent {
    record.state = new_state;
    if let Some(lease) = fields.lease_seconds {
        record.lease_seconds = lease;
    }
    if let Some(at) = fields.confirmed_at {
        record.confirmed_at = Some(at);
    }
    if fields.denial_reason.is_some() {
        record.denial_reason = fields.denial_reason;
    }

    let topic = record.topic.clone();
    match new_state {
        SubscriptionState::Confirmed => RegistryEvent::Confirmed {
            topic,
            lease_seconds: record.lease_seconds,
        },
        SubscriptionState::Denied => RegistryEvent::Denied {
            topic,
            reason: record.denial_reason.clone(),
        },
        SubscriptionState::Expired => RegistryEvent::Expired { topic },
        SubscriptionState::Pending => RegistryEvent::Registered {
            topic,
            superseded: false,
        },
    }
}
