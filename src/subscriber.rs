//! Public entry point tying the registry, initiator and verification
//! handler together.

use crate::config::SubscriberConfig;
use crate::error::{Result, SubscriberError};
use crate::hubs::HubDirectory;
use crate::initiator::{HttpTransport, HubTransport, Initiator, SubscribeOptions};
use crate::registry::{Registry, WatchConfig, WatchHandle};
use crate::server;
use crate::token::{CallbackToken, EntropySource, OsEntropy};
use crate::types::{parse_topic, SubscriptionRecord, Timestamp};
use crate::verification::{VerificationHandler, VerificationParams, VerificationResponse};
use std::sync::Arc;
use url::Url;

/// Outcome of [`Subscriber::sweep_expired`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Topics whose lease ran out during this sweep.
    pub expired: Vec<String>,
    /// Topics whose finished records were dropped.
    pub purged: Vec<String>,
}

struct Inner<T, H> {
    config: SubscriberConfig,
    registry: Arc<Registry>,
    initiator: Initiator<T>,
    verifier: VerificationHandler,
    hubs: H,
}

/// WebSub subscriber.
///
/// Cheap to clone; clones share one registry.
pub struct Subscriber<T = HttpTransport, H = crate::hubs::StaticHubs> {
    inner: Arc<Inner<T, H>>,
}

impl<T, H> Clone for Subscriber<T, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: HubDirectory> Subscriber<HttpTransport, H> {
    /// Subscriber talking to hubs over HTTP.
    pub fn new(config: SubscriberConfig, hubs: H) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, hubs, transport))
    }
}

impl<T: HubTransport, H: HubDirectory> Subscriber<T, H> {
    pub fn with_transport(config: SubscriberConfig, hubs: H, transport: T) -> Self {
        Self::with_entropy(config, hubs, transport, Box::new(OsEntropy))
    }

    /// Full control over collaborators, including the token entropy source.
    pub fn with_entropy(
        config: SubscriberConfig,
        hubs: H,
        transport: T,
        entropy: Box<dyn EntropySource>,
    ) -> Self {
        let registry = Arc::new(Registry::new());
        let initiator = Initiator::with_entropy(
            Arc::clone(&registry),
            transport,
            config.callback_prefix(),
            entropy,
        );
        let verifier = VerificationHandler::new(Arc::clone(&registry));
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                initiator,
                verifier,
                hubs,
            }),
        }
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn hubs(&self) -> &H {
        &self.inner.hubs
    }

    /// Subscribe with the configured default lease and no deadline.
    pub async fn subscribe_to_topic(&self, topic: &str) -> Result<SubscriptionRecord> {
        let options = SubscribeOptions {
            lease_seconds: self.inner.config.default_lease_seconds,
            deadline: None,
        };
        self.subscribe_with(topic, options).await
    }

    /// Subscribe to `topic` through the hub the directory names for it.
    ///
    /// Success means the hub accepted the request; the returned record is
    /// normally still pending until the hub calls back.
    pub async fn subscribe_with(
        &self,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<SubscriptionRecord> {
        let (topic, hub) = self.resolve(topic)?;
        self.inner.initiator.subscribe(&topic, &hub, &options).await
    }

    /// Ask the hub to end the subscription for `topic`.
    pub async fn unsubscribe_from_topic(&self, topic: &str) -> Result<()> {
        let (topic, hub) = self.resolve(topic)?;
        self.inner.initiator.unsubscribe(&topic, &hub, None).await
    }

    /// Answer a verification request addressed to `<base>/callback/<token>`.
    pub fn handle_verification(
        &self,
        token: &str,
        params: &VerificationParams,
    ) -> VerificationResponse {
        let token = CallbackToken::from_path_segment(token);
        self.inner.verifier.handle(&token, params)
    }

    pub fn verification_handler(&self) -> VerificationHandler {
        self.inner.verifier.clone()
    }

    /// Callback URL the hub is told to use for `token`.
    pub fn callback_url(&self, token: &CallbackToken) -> String {
        self.inner.initiator.callback_url(token)
    }

    /// When the confirmed lease for `topic` runs out.
    pub fn lease_expiry(&self, topic: &str) -> Option<Timestamp> {
        let topic = parse_topic(topic).ok()?;
        self.inner
            .registry
            .get_by_topic(topic.as_str())
            .and_then(|record| record.expires_at())
    }

    pub fn subscription(&self, topic: &str) -> Option<SubscriptionRecord> {
        let topic = parse_topic(topic).ok()?;
        self.inner.registry.get_by_topic(topic.as_str())
    }

    /// Expire elapsed leases and drop finished records.
    pub fn sweep_expired(&self) -> SweepSummary {
        self.sweep_expired_at(Timestamp::now())
    }

    pub fn sweep_expired_at(&self, now: Timestamp) -> SweepSummary {
        let expired = self.inner.registry.expire_due(now);
        let purged = self.inner.registry.purge_finished();
        SweepSummary { expired, purged }
    }

    pub fn watch(&self, config: WatchConfig) -> WatchHandle {
        self.inner.registry.watch(config)
    }

    /// Callback router for embedding into an existing server.
    pub fn router(&self) -> axum::Router {
        server::router(self.verification_handler(), &self.inner.config.callback_base)
    }

    /// Run the callback server on the configured address.
    pub async fn serve(&self) -> Result<()> {
        server::serve(&self.inner.config, self.verification_handler()).await
    }

    fn resolve(&self, topic: &str) -> Result<(Url, Url)> {
        let topic = parse_topic(topic)?;
        let hub = self
            .inner
            .hubs
            .hub_for(&topic)
            .ok_or_else(|| SubscriberError::NoHubForTopic(topic.to_string()))?;
        Ok((topic, hub))
    }
}
