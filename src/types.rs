//! Core types for subscription tracking.

use crate::error::{Result, SubscriberError};
use crate::token::CallbackToken;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// This timestamp shifted forward by `duration`.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let micros = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }

    /// Convert to `SystemTime` for callers scheduling renewals.
    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.0.max(0) as u64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Lifecycle state of a subscription.
///
/// ```text
/// Pending --verify--> Confirmed --lease elapses--> Expired
///    \
///     `--rejected/denied--> Denied
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Pending,
    Confirmed,
    Expired,
    Denied,
}

impl SubscriptionState {
    /// Whether `next` is reachable from this state in one step.
    pub fn can_transition_to(self, next: SubscriptionState) -> bool {
        use SubscriptionState::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Denied) | (Confirmed, Expired)
        )
    }

    /// Pending and Confirmed records occupy their topic; the others are
    /// waiting to be garbage-collected.
    pub fn is_live(self) -> bool {
        matches!(self, SubscriptionState::Pending | SubscriptionState::Confirmed)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionState::Pending => "pending",
            SubscriptionState::Confirmed => "confirmed",
            SubscriptionState::Expired => "expired",
            SubscriptionState::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// Value of `hub.mode` in hub requests and verification callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Subscribe,
    Unsubscribe,
    /// Sent by a hub that refuses a subscription.
    Denied,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Subscribe => "subscribe",
            Mode::Unsubscribe => "unsubscribe",
            Mode::Denied => "denied",
        }
    }

    /// Parse a `hub.mode` value. Matching is exact.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subscribe" => Some(Mode::Subscribe),
            "unsubscribe" => Some(Mode::Unsubscribe),
            "denied" => Some(Mode::Denied),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked subscription. The registry owns the canonical copy; every
/// other component sees clones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Canonical topic URL.
    pub topic: String,

    /// Token embedded in the callback URL for this attempt.
    pub callback_token: CallbackToken,

    pub state: SubscriptionState,

    /// Lease granted by the hub. Zero until confirmed.
    pub lease_seconds: u64,

    /// Set when the hub verified the subscription.
    pub confirmed_at: Option<Timestamp>,

    /// When the record was registered.
    pub created_at: Timestamp,

    /// Reason given by the hub, if it denied the subscription.
    pub denial_reason: Option<String>,

    /// Set once we have asked the hub to end this subscription. Only then
    /// may a `hub.mode=unsubscribe` verification remove it.
    #[serde(default)]
    pub unsubscribe_requested: bool,
}

impl SubscriptionRecord {
    /// A fresh pending record.
    pub fn pending(topic: impl Into<String>, callback_token: CallbackToken) -> Self {
        Self {
            topic: topic.into(),
            callback_token,
            state: SubscriptionState::Pending,
            lease_seconds: 0,
            confirmed_at: None,
            created_at: Timestamp::now(),
            denial_reason: None,
            unsubscribe_requested: false,
        }
    }

    /// When the lease runs out. `None` while unconfirmed or when the hub
    /// reported no lease.
    pub fn expires_at(&self) -> Option<Timestamp> {
        if self.lease_seconds == 0 {
            return None;
        }
        self.confirmed_at
            .map(|at| at.saturating_add(Duration::from_secs(self.lease_seconds)))
    }

    /// Whether a confirmed lease has run out at `now`.
    pub fn lease_elapsed(&self, now: Timestamp) -> bool {
        self.state == SubscriptionState::Confirmed
            && self.expires_at().is_some_and(|expiry| expiry <= now)
    }
}

/// Fields written alongside a state transition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionFields {
    pub lease_seconds: Option<u64>,
    pub confirmed_at: Option<Timestamp>,
    pub denial_reason: Option<String>,
}

impl TransitionFields {
    /// Fields for a confirmation at `now`.
    pub fn confirmed(lease_seconds: u64, now: Timestamp) -> Self {
        Self {
            lease_seconds: Some(lease_seconds),
            confirmed_at: Some(now),
            ..Default::default()
        }
    }

    pub fn denied(reason: Option<String>) -> Self {
        Self {
            denial_reason: reason,
            ..Default::default()
        }
    }
}

/// Validate a topic and return its canonical form.
///
/// The topic must be a non-empty absolute URL with a host.
pub fn parse_topic(topic: &str) -> Result<Url> {
    let trimmed = topic.trim();
    if trimmed.is_empty() {
        return Err(SubscriberError::InvalidTopic("topic is empty".to_string()));
    }
    let url = Url::parse(trimmed)?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(SubscriberError::InvalidTopic(format!(
            "{} is not an absolute URL with a host",
            trimmed
        )));
    }
    Ok(url)
}
