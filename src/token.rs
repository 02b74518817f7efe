//! Callback token generation.
//!
//! Every subscription attempt gets its own token, which becomes the last
//! path segment of the callback URL handed to the hub. Tokens carry 256 bits
//! from the operating system's CSPRNG, hex encoded.

use crate::error::{Result, SubscriberError};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 32;

/// Opaque per-attempt callback identity.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallbackToken(String);

impl CallbackToken {
    /// Wrap a token received from the outside (e.g. a callback path segment).
    pub fn from_path_segment(segment: &str) -> Self {
        CallbackToken(segment.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix, safe to put in logs.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        self.0.get(..end).unwrap_or("")
    }
}

impl fmt::Debug for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallbackToken({}...)", self.short())
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of random bytes for tokens.
pub trait EntropySource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), rand::Error>;
}

impl<E: EntropySource + ?Sized> EntropySource for Box<E> {
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), rand::Error> {
        (**self).fill(buf)
    }
}

/// Operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), rand::Error> {
        OsRng.try_fill_bytes(buf)
    }
}

/// Produces callback tokens.
#[derive(Clone, Debug, Default)]
pub struct TokenGenerator<E = OsEntropy> {
    entropy: E,
}

impl TokenGenerator<OsEntropy> {
    pub fn new() -> Self {
        Self { entropy: OsEntropy }
    }
}

impl<E: EntropySource> TokenGenerator<E> {
    /// Use a custom entropy source.
    pub fn with_entropy(entropy: E) -> Self {
        Self { entropy }
    }

    /// Generate a fresh token. Fails if the entropy source fails; callers
    /// must not create a subscription record in that case.
    pub fn new_token(&self) -> Result<CallbackToken> {
        let mut bytes = [0u8; TOKEN_BYTES];
        self.entropy
            .fill(&mut bytes)
            .map_err(|e| SubscriberError::Generation(e.to_string()))?;
        Ok(CallbackToken(hex::encode(bytes)))
    }
}
