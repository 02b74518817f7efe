//! Authoritative in-memory store of subscription records.
//!
//! The registry maps topic → record and callback token → topic. All reads
//! and writes go through its methods; no caller ever holds its locks.
//!
//! - Structural changes (`put`, `delete`) take the index write lock briefly.
//! - Lookups and transitions share the index read lock and lock only the
//!   record they touch, so work on different topics does not serialize.
//! - Nothing here awaits or performs I/O.
//!
//! # Example
//!
//! ```ignore
//! let registry = Registry::new();
//! let token = TokenGenerator::new().new_token()?;
//! registry.put(SubscriptionRecord::pending("http://example.com/feed", token.clone()))?;
//!
//! let confirmed = registry.transition(
//!     &token,
//!     SubscriptionState::Confirmed,
//!     TransitionFields::confirmed(20, Timestamp::now()),
//! );
//! assert!(confirmed);
//! ```

mod events;
mod manager;

pub use events::{DropReason, RegistryEvent, WatchConfig, WatchHandle, WatchId};
pub use manager::Registry;
