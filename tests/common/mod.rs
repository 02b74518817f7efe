//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;
use url::{form_urlencoded, Url};
use websub_subscriber::{
    HubResponse, HubTransport, StaticHubs, Subscriber, SubscriberConfig,
};

pub const FEED: &str = "http://example.com/feed";

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// ── MockHub ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("connection refused")]
pub struct MockHubError;

/// One form POST received by the mock hub.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub hub: Url,
    pub fields: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Last path segment of `hub.callback`.
    pub fn token(&self) -> String {
        self.get("hub.callback")
            .and_then(|cb| cb.rsplit('/').next())
            .unwrap_or_default()
            .to_string()
    }
}

type Hook = Arc<dyn Fn(&RecordedRequest) + Send + Sync>;

struct MockHubState {
    status: Option<u16>,
    delay: Option<Duration>,
    hook: Option<Hook>,
    requests: Vec<RecordedRequest>,
}

/// In-process stand-in for a hub's subscription endpoint.
#[derive(Clone)]
pub struct MockHub {
    state: Arc<Mutex<MockHubState>>,
}

impl MockHub {
    fn answering(status: Option<u16>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockHubState {
                status,
                delay: None,
                hook: None,
                requests: Vec::new(),
            })),
        }
    }

    pub fn accepting() -> Self {
        Self::answering(Some(202))
    }

    pub fn rejecting(status: u16) -> Self {
        Self::answering(Some(status))
    }

    /// Answer every request with `status`.
    pub fn responding(status: u16) -> Self {
        Self::answering(Some(status))
    }

    pub fn unreachable() -> Self {
        Self::answering(None)
    }

    /// Wait this long before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    /// Run `hook` on every request before answering.
    pub fn with_hook(self, hook: impl Fn(&RecordedRequest) + Send + Sync + 'static) -> Self {
        self.state.lock().unwrap().hook = Some(Arc::new(hook));
        self
    }

    pub fn set_status(&self, status: Option<u16>) {
        self.state.lock().unwrap().status = status;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("hub received no request")
    }
}

impl HubTransport for MockHub {
    type Error = MockHubError;

    async fn post_form(&self, hub: &Url, body: String) -> Result<HubResponse, MockHubError> {
        let request = RecordedRequest {
            hub: hub.clone(),
            fields: form_urlencoded::parse(body.as_bytes()).into_owned().collect(),
        };

        let (status, delay, hook) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            (state.status, state.delay, state.hook.clone())
        };

        if let Some(hook) = hook {
            hook(&request);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match status {
            Some(status) => Ok(HubResponse {
                status,
                body: format!("status {}", status),
            }),
            None => Err(MockHubError),
        }
    }
}

// ── Subscriber helpers ────────────────────────────────────────────────────────

/// Subscriber on port 4000 whose topics are their own hubs.
pub fn subscriber(hub: MockHub) -> Subscriber<MockHub, StaticHubs> {
    init_tracing();
    let fallback = Url::parse("http://hub.example.com/").unwrap();
    Subscriber::with_transport(
        SubscriberConfig::for_port(4000),
        StaticHubs::with_fallback(fallback),
        hub,
    )
}

pub fn form_body(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

pub fn subscribe_pairs<'a>(challenge: &'a str, lease: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("hub.mode", "subscribe"),
        ("hub.topic", FEED),
        ("hub.challenge", challenge),
        ("hub.lease_seconds", lease),
    ]
}

/// Response as seen by the hub.
#[derive(Debug)]
pub struct HubView {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HubView {
    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

pub async fn call(router: Router, request: Request<Body>) -> HubView {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    HubView {
        status,
        content_type,
        body,
    }
}

/// Form-encoded POST to `/callback/<token>`, as most hubs send it.
pub fn post_callback(token: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/callback/{}", token))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form_body(pairs)))
        .unwrap()
}

/// GET `/callback/<token>?<query>`.
pub fn get_callback(token: &str, pairs: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(format!("/callback/{}?{}", token, form_body(pairs)))
        .body(Body::empty())
        .unwrap()
}
