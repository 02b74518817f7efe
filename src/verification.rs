//! Hub-initiated verification of intent.
//!
//! A hub proves that the subscriber really asked for a subscription by
//! calling `<base>/callback/<token>` with a challenge that must be echoed
//! back byte-for-byte. Everything that goes wrong here ends as a status
//! code for the hub; nothing propagates to the subscriber's caller.

use crate::registry::Registry;
use crate::token::CallbackToken;
use crate::types::{Mode, SubscriptionState, Timestamp, TransitionFields};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const PARAM_MODE: &str = "hub.mode";
pub const PARAM_TOPIC: &str = "hub.topic";
pub const PARAM_CHALLENGE: &str = "hub.challenge";
pub const PARAM_LEASE_SECONDS: &str = "hub.lease_seconds";
pub const PARAM_REASON: &str = "hub.reason";

/// Raw `hub.*` parameters from the query string and/or form body.
///
/// The challenge is kept as the exact decoded bytes the hub sent, since it
/// has to be echoed unchanged even when it is not valid UTF-8.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationParams {
    pub mode: Option<String>,
    pub topic: Option<String>,
    pub challenge: Option<Vec<u8>>,
    pub lease_seconds: Option<String>,
    pub reason: Option<String>,
}

impl VerificationParams {
    /// Collect parameters from key/value pairs. The first occurrence of a
    /// key wins; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<[u8]>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            if key.as_ref() == PARAM_CHALLENGE {
                params.challenge.get_or_insert_with(|| value.to_vec());
                continue;
            }
            let slot = match key.as_ref() {
                PARAM_MODE => &mut params.mode,
                PARAM_TOPIC => &mut params.topic,
                PARAM_LEASE_SECONDS => &mut params.lease_seconds,
                PARAM_REASON => &mut params.reason,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(String::from_utf8_lossy(value).into_owned());
            }
        }
        params
    }

    fn validate(&self) -> Result<Verification, VerificationError> {
        let mode_value = self
            .mode
            .as_deref()
            .ok_or_else(|| VerificationError::Malformed("missing hub.mode".to_string()))?;
        let mode = Mode::parse(mode_value).ok_or_else(|| {
            VerificationError::Malformed(format!("unsupported hub.mode {:?}", mode_value))
        })?;

        let topic = self
            .topic
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VerificationError::Malformed("missing hub.topic".to_string()))?;

        let challenge = match mode {
            Mode::Denied => Vec::new(),
            Mode::Subscribe | Mode::Unsubscribe => self
                .challenge
                .clone()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    VerificationError::Malformed("missing hub.challenge".to_string())
                })?,
        };

        let lease_seconds = match (mode, self.lease_seconds.as_deref()) {
            (Mode::Subscribe, Some(raw)) => raw.trim().parse::<u64>().map_err(|_| {
                VerificationError::Malformed(format!("invalid hub.lease_seconds {:?}", raw))
            })?,
            _ => 0,
        };

        Ok(Verification {
            mode,
            topic: canonical_topic(topic),
            challenge,
            lease_seconds,
            reason: self.reason.clone(),
        })
    }
}

/// Parameters after validation.
struct Verification {
    mode: Mode,
    topic: String,
    challenge: Vec<u8>,
    lease_seconds: u64,
    reason: Option<String>,
}

/// Why a verification request was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// No record behind the token.
    #[error("unknown callback")]
    NotFound,

    /// The token resolved, but to a different topic.
    #[error("topic does not match subscription")]
    TopicMismatch,

    /// `hub.mode=unsubscribe` for a subscription nobody asked to end.
    #[error("unsubscription was not requested")]
    UnsubscribeNotRequested,

    #[error("malformed verification request: {0}")]
    Malformed(String),
}

impl VerificationError {
    /// Status code sent to the hub. Mismatches look exactly like unknown
    /// callbacks.
    pub fn status(&self) -> u16 {
        match self {
            VerificationError::NotFound
            | VerificationError::TopicMismatch
            | VerificationError::UnsubscribeNotRequested => 404,
            VerificationError::Malformed(_) => 400,
        }
    }
}

/// What to send back to the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResponse {
    pub status: u16,
    /// `text/plain` body; the challenge bytes on success.
    pub body: Vec<u8>,
}

impl VerificationResponse {
    pub const CONTENT_TYPE: &'static str = "text/plain";

    fn echo(challenge: Vec<u8>) -> Self {
        Self {
            status: 200,
            body: challenge,
        }
    }

    fn refused(error: &VerificationError) -> Self {
        Self {
            status: error.status(),
            body: Vec::new(),
        }
    }
}

/// Resolves inbound verification requests against the registry.
#[derive(Clone)]
pub struct VerificationHandler {
    registry: Arc<Registry>,
}

impl VerificationHandler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Handle one verification request for `token`.
    pub fn handle(
        &self,
        token: &CallbackToken,
        params: &VerificationParams,
    ) -> VerificationResponse {
        match self.verify(token, params) {
            Ok(body) => VerificationResponse::echo(body),
            Err(error) => {
                debug!(token = token.short(), error = %error, "Refused verification request");
                VerificationResponse::refused(&error)
            }
        }
    }

    fn verify(
        &self,
        token: &CallbackToken,
        params: &VerificationParams,
    ) -> Result<Vec<u8>, VerificationError> {
        let record = self
            .registry
            .get_by_token(token)
            .ok_or(VerificationError::NotFound)?;

        let request = params.validate()?;
        if request.topic != record.topic {
            warn!(topic = %record.topic, "Verification topic does not match subscription");
            return Err(VerificationError::TopicMismatch);
        }

        match request.mode {
            Mode::Subscribe => {
                let confirmed = self.registry.transition(
                    token,
                    SubscriptionState::Confirmed,
                    TransitionFields::confirmed(request.lease_seconds, Timestamp::now()),
                );
                if confirmed {
                    info!(
                        topic = %record.topic,
                        lease_seconds = request.lease_seconds,
                        "Subscription confirmed"
                    );
                } else {
                    debug!(
                        topic = %record.topic,
                        state = %record.state,
                        "Repeated subscribe verification"
                    );
                }
            }
            Mode::Unsubscribe => {
                if !record.unsubscribe_requested {
                    warn!(topic = %record.topic, "Unsubscribe verification without a request");
                    return Err(VerificationError::UnsubscribeNotRequested);
                }
                if self.registry.remove_by_token(token).is_some() {
                    info!(topic = %record.topic, "Unsubscription confirmed");
                }
            }
            Mode::Denied => {
                let denied = self.registry.transition(
                    token,
                    SubscriptionState::Denied,
                    TransitionFields::denied(request.reason.clone()),
                );
                if denied {
                    warn!(
                        topic = %record.topic,
                        reason = ?request.reason,
                        "Hub denied subscription"
                    );
                }
            }
        }

        Ok(request.challenge)
    }
}

/// Compare topics in the same canonical form the initiator sent them in.
fn canonical_topic(topic: &str) -> String {
    Url::parse(topic)
        .map(|url| url.as_str().to_string())
        .unwrap_or_else(|_| topic.to_string())
}
