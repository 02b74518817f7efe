//! Error handling and edge case tests.

mod common;

use common::*;
use url::Url;
use websub_subscriber::{
    EntropySource, StaticHubs, Subscriber, SubscriberConfig, SubscriberError, SubscriptionState,
};

struct BrokenEntropy;

impl EntropySource for BrokenEntropy {
    fn fill(&self, _buf: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new("no entropy available"))
    }
}

// --- Outbound errors ---

#[tokio::test]
async fn test_invalid_topics() {
    let hub = MockHub::accepting();
    let subscriber = subscriber(hub.clone());

    for topic in ["", "   ", "feed", "/relative/feed", "mailto:someone@example.com"] {
        let err = subscriber.subscribe_to_topic(topic).await.unwrap_err();
        assert!(
            matches!(err, SubscriberError::InvalidTopic(_)),
            "{:?} gave {:?}",
            topic,
            err
        );
    }
    assert!(subscriber.registry().is_empty());
    assert!(hub.requests().is_empty());
}

#[tokio::test]
async fn test_entropy_failure_creates_no_record() {
    init_tracing();
    let hub = MockHub::accepting();
    let subscriber = Subscriber::with_entropy(
        SubscriberConfig::for_port(4000),
        StaticHubs::with_fallback(Url::parse("http://hub.example.com/").unwrap()),
        hub.clone(),
        Box::new(BrokenEntropy),
    );

    let err = subscriber.subscribe_to_topic(FEED).await.unwrap_err();
    assert!(matches!(err, SubscriberError::Generation(_)));
    assert!(subscriber.registry().is_empty());
    assert!(hub.requests().is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_retryable() {
    let hub = MockHub::unreachable();
    let subscriber = subscriber(hub.clone());

    let err = subscriber.subscribe_to_topic(FEED).await.unwrap_err();
    assert!(matches!(err, SubscriberError::Transport(_)));
    assert!(err.is_retryable());
    let first_token = hub.last_request().token();
    assert_eq!(
        subscriber.subscription(FEED).unwrap().state,
        SubscriptionState::Pending
    );

    // Hub comes back; a retry replaces the earlier attempt
    hub.set_status(Some(202));
    let record = subscriber.subscribe_to_topic(FEED).await.unwrap();
    assert_eq!(record.state, SubscriptionState::Pending);
    assert_ne!(record.callback_token.as_str(), first_token);
    assert_eq!(subscriber.registry().len(), 1);
}

#[tokio::test]
async fn test_rejection_is_not_retryable() {
    let subscriber = subscriber(MockHub::rejecting(400));
    let err = subscriber.subscribe_to_topic(FEED).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unsubscribe_without_subscription() {
    let hub = MockHub::accepting();
    let subscriber = subscriber(hub.clone());

    let err = subscriber.unsubscribe_from_topic(FEED).await.unwrap_err();
    assert!(matches!(err, SubscriberError::NotSubscribed(_)));
    assert!(hub.requests().is_empty());
}

#[tokio::test]
async fn test_unsubscribe_denied_record() {
    let hub = MockHub::rejecting(403);
    let subscriber = subscriber(hub.clone());
    let _ = subscriber.subscribe_to_topic(FEED).await;

    let err = subscriber.unsubscribe_from_topic(FEED).await.unwrap_err();
    assert!(matches!(err, SubscriberError::NotSubscribed(_)));
}

#[tokio::test]
async fn test_hub_rejects_unsubscription() {
    let hub = MockHub::accepting();
    let subscriber = subscriber(hub.clone());
    subscriber.subscribe_to_topic(FEED).await.unwrap();

    hub.set_status(Some(500));
    let err = subscriber.unsubscribe_from_topic(FEED).await.unwrap_err();
    assert!(matches!(
        err,
        SubscriberError::SubscriptionRejected { status: 500, .. }
    ));
    // Still subscribed as far as we know
    assert_eq!(
        subscriber.subscription(FEED).unwrap().state,
        SubscriptionState::Pending
    );
}

#[tokio::test]
async fn test_no_hub_for_topic() {
    init_tracing();
    let hub = MockHub::accepting();
    let subscriber = Subscriber::with_transport(
        SubscriberConfig::for_port(4000),
        StaticHubs::new(),
        hub.clone(),
    );

    let err = subscriber.subscribe_to_topic(FEED).await.unwrap_err();
    assert!(matches!(err, SubscriberError::NoHubForTopic(_)));
    assert!(hub.requests().is_empty());
}

// --- Inbound errors never reach the caller ---

#[tokio::test]
async fn test_verification_errors_only_become_status_codes() {
    let hub = MockHub::accepting();
    let subscriber = subscriber(hub.clone());
    let record = subscriber.subscribe_to_topic(FEED).await.unwrap();

    let garbage = websub_subscriber::VerificationParams::default();
    assert_eq!(
        subscriber
            .handle_verification(record.callback_token.as_str(), &garbage)
            .status,
        400
    );
    assert_eq!(subscriber.handle_verification("nope", &garbage).status, 404);

    // The outbound path is unaffected
    subscriber.subscribe_to_topic("http://example.com/other").await.unwrap();
    assert_eq!(subscriber.registry().len(), 2);
}
