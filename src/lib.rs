//! # WebSub Subscriber
//!
//! The subscriber side of the WebSub hub/topic protocol: ask a hub to push
//! updates for a topic, prove ownership of the callback endpoint through the
//! hub's challenge, and track each subscription's lease.
//!
//! ## Core Concepts
//!
//! - **Registry**: the single in-memory owner of every subscription record,
//!   indexed by topic and by callback token
//! - **Tokens**: 256-bit random callback identities, one per attempt
//! - **Initiator**: registers a pending record, then POSTs to the hub
//! - **Verification**: resolves the hub's callback, checks it, echoes the
//!   challenge and moves the record to its next state
//!
//! ## Example
//!
//! ```ignore
//! use websub_subscriber::{StaticHubs, Subscriber, SubscriberConfig};
//!
//! let hubs = StaticHubs::new();
//! hubs.insert(&"http://example.com/feed".parse()?, "http://hub.example.com/".parse()?);
//!
//! let subscriber = Subscriber::new(SubscriberConfig::for_port(4000), hubs)?;
//! tokio::spawn({
//!     let subscriber = subscriber.clone();
//!     async move { subscriber.serve().await }
//! });
//!
//! // Pending until the hub calls back on /callback/<token>
//! let record = subscriber.subscribe_to_topic("http://example.com/feed").await?;
//! ```

pub mod config;
pub mod error;
pub mod hubs;
pub mod initiator;
pub mod registry;
pub mod server;
pub mod subscriber;
pub mod token;
pub mod types;
pub mod verification;

// Re-exports
pub use config::SubscriberConfig;
pub use error::{Result, SubscriberError};
pub use hubs::{HubDirectory, StaticHubs};
pub use initiator::{
    HttpTransport, HubRequest, HubResponse, HubTransport, Initiator, SubscribeOptions,
};
pub use registry::{DropReason, Registry, RegistryEvent, WatchConfig, WatchHandle, WatchId};
pub use subscriber::{Subscriber, SweepSummary};
pub use token::{CallbackToken, EntropySource, OsEntropy, TokenGenerator};
pub use types::*;
pub use verification::{
    VerificationError, VerificationHandler, VerificationParams, VerificationResponse,
};
