//! Outbound subscription requests.
//!
//! The initiator registers a pending record *before* talking to the hub so
//! that a verification callback racing ahead of the POST response still
//! resolves. A 2xx answer only means the hub accepted the request for
//! processing; confirmation arrives later through the callback.

use crate::error::{Result, SubscriberError};
use crate::registry::Registry;
use crate::token::{CallbackToken, EntropySource, OsEntropy, TokenGenerator};
use crate::types::{Mode, SubscriptionRecord, SubscriptionState, TransitionFields};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use url::Url;

/// Sends form-encoded requests to a hub.
///
/// Retry, TLS and pooling belong to the implementation; the initiator only
/// needs a status code and a body back.
pub trait HubTransport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn post_form(
        &self,
        hub: &Url,
        body: String,
    ) -> impl Future<Output = std::result::Result<HubResponse, Self::Error>> + Send;
}

/// What the hub answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubResponse {
    pub status: u16,
    pub body: String,
}

impl HubResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A `hub.mode=subscribe|unsubscribe` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubRequest {
    pub mode: Mode,
    pub topic: String,
    pub callback: String,
    pub lease_seconds: Option<u64>,
}

impl HubRequest {
    /// `application/x-www-form-urlencoded` body.
    pub fn encode(&self) -> String {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("hub.mode", self.mode.as_str())
            .append_pair("hub.topic", &self.topic)
            .append_pair("hub.callback", &self.callback);
        if let Some(lease) = self.lease_seconds {
            form.append_pair("hub.lease_seconds", &lease.to_string());
        }
        form.finish()
    }
}

/// Per-call knobs for a subscription request.
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    /// Lease to propose to the hub.
    pub lease_seconds: Option<u64>,

    /// Give up waiting for the hub after this long. The record stays
    /// pending; the hub may still verify later.
    pub deadline: Option<Duration>,
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HubTransport for HttpTransport {
    type Error = reqwest::Error;

    async fn post_form(
        &self,
        hub: &Url,
        body: String,
    ) -> std::result::Result<HubResponse, Self::Error> {
        let response = self
            .client
            .post(hub.clone())
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HubResponse { status, body })
    }
}

/// Issues subscribe/unsubscribe requests and keeps the registry in step.
pub struct Initiator<T> {
    registry: Arc<Registry>,
    tokens: TokenGenerator<Box<dyn EntropySource>>,
    transport: T,
    callback_prefix: String,
}

impl<T: HubTransport> Initiator<T> {
    /// `callback_prefix` is the callback base without a trailing slash, as
    /// returned by [`SubscriberConfig::callback_prefix`].
    ///
    /// [`SubscriberConfig::callback_prefix`]: crate::config::SubscriberConfig::callback_prefix
    pub fn new(registry: Arc<Registry>, transport: T, callback_prefix: impl Into<String>) -> Self {
        Self::with_entropy(registry, transport, callback_prefix, Box::new(OsEntropy))
    }

    pub fn with_entropy(
        registry: Arc<Registry>,
        transport: T,
        callback_prefix: impl Into<String>,
        entropy: Box<dyn EntropySource>,
    ) -> Self {
        Self {
            registry,
            tokens: TokenGenerator::with_entropy(entropy),
            transport,
            callback_prefix: callback_prefix.into(),
        }
    }

    /// `<base>/callback/<token>`
    pub fn callback_url(&self, token: &CallbackToken) -> String {
        format!("{}/callback/{}", self.callback_prefix, token)
    }

    /// Register a pending record for `topic` and ask `hub` to subscribe.
    ///
    /// Returns the record as it stands once the hub has accepted the request.
    /// Non-2xx answers deny the record; transport failures and deadlines
    /// leave it pending.
    pub async fn subscribe(
        &self,
        topic: &Url,
        hub: &Url,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionRecord> {
        let token = self.tokens.new_token()?;
        let record = SubscriptionRecord::pending(topic.as_str(), token.clone());
        self.registry.put(record.clone())?;

        let request = HubRequest {
            mode: Mode::Subscribe,
            topic: topic.as_str().to_string(),
            callback: self.callback_url(&token),
            lease_seconds: options.lease_seconds,
        };

        info!(topic = %topic, hub = %hub, token = token.short(), "Sending subscription request");
        let response = self.send(hub, &request, options.deadline).await?;

        if !response.is_success() {
            warn!(topic = %topic, status = response.status, "Hub rejected subscription request");
            self.registry.transition(
                &token,
                SubscriptionState::Denied,
                TransitionFields::denied(Some(format!("hub responded {}", response.status))),
            );
            return Err(SubscriberError::SubscriptionRejected {
                status: response.status,
                body: response.body,
            });
        }

        debug!(topic = %topic, status = response.status, "Hub accepted subscription request");
        Ok(self.registry.get_by_token(&token).unwrap_or(record))
    }

    /// Ask `hub` to drop the live subscription for `topic`. The record is
    /// removed once the hub verifies the unsubscription; until then it is
    /// marked as awaiting one, so the hub's callback is recognised.
    pub async fn unsubscribe(
        &self,
        topic: &Url,
        hub: &Url,
        deadline: Option<Duration>,
    ) -> Result<()> {
        let record = self
            .registry
            .get_by_topic(topic.as_str())
            .filter(|r| r.state.is_live())
            .ok_or_else(|| SubscriberError::NotSubscribed(topic.to_string()))?;

        let request = HubRequest {
            mode: Mode::Unsubscribe,
            topic: record.topic.clone(),
            callback: self.callback_url(&record.callback_token),
            lease_seconds: None,
        };

        // Marked before sending, the hub may verify before it answers
        let token = &record.callback_token;
        if !self.registry.set_unsubscribe_requested(token, true) {
            return Err(SubscriberError::NotSubscribed(topic.to_string()));
        }

        info!(topic = %topic, hub = %hub, "Sending unsubscription request");
        let response = self.send(hub, &request, deadline).await?;
        if !response.is_success() {
            warn!(topic = %topic, status = response.status, "Hub rejected unsubscription request");
            self.registry.set_unsubscribe_requested(token, false);
            return Err(SubscriberError::SubscriptionRejected {
                status: response.status,
                body: response.body,
            });
        }
        Ok(())
    }

    async fn send(
        &self,
        hub: &Url,
        request: &HubRequest,
        deadline: Option<Duration>,
    ) -> Result<HubResponse> {
        let call = self.transport.post_form(hub, request.encode());
        let outcome = match deadline {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| SubscriberError::DeadlineExceeded(limit))?,
            None => call.await,
        };
        outcome.map_err(|e| {
            warn!(hub = %hub, error = %e, "Hub request failed");
            SubscriberError::Transport(e.to_string())
        })
    }
}
