//! Subscriber configuration.

use crate::error::{Result, SubscriberError};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use url::Url;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration for a [`crate::Subscriber`].
///
/// Resolved from environment variables by [`SubscriberConfig::from_env`]:
/// - `WEBSUB_PORT`: callback server port (default: 4000)
/// - `WEBSUB_BIND_ADDRESS`: callback server address (default: 0.0.0.0)
/// - `WEBSUB_CALLBACK_BASE`: public URL prefix of the callback server
///   (default: `http://localhost:<port>`)
/// - `WEBSUB_REQUEST_TIMEOUT_SECS`: outbound hub request timeout (default: 30)
/// - `WEBSUB_LEASE_SECONDS`: lease proposed to hubs (default: none)
#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    /// Port the callback server listens on.
    pub port: u16,

    /// Address the callback server binds to.
    pub bind_address: IpAddr,

    /// Public prefix hubs use to reach the callback server.
    pub callback_base: Url,

    /// Timeout for outbound hub requests.
    pub request_timeout: Duration,

    /// Lease proposed with every subscription unless overridden per call.
    pub default_lease_seconds: Option<u64>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self::for_port(DEFAULT_PORT)
    }
}

impl SubscriberConfig {
    /// Listen on `port` and advertise `http://localhost:<port>`.
    pub fn for_port(port: u16) -> Self {
        Self {
            port,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            callback_base: localhost_base(port),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            default_lease_seconds: None,
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from any key/value source.
    ///
    /// Unparseable numbers fall back to their defaults; an unparseable
    /// callback base is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("WEBSUB_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let mut config = Self::for_port(port);

        if let Some(addr) = lookup("WEBSUB_BIND_ADDRESS").and_then(|a| a.parse().ok()) {
            config.bind_address = addr;
        }

        if let Some(base) = lookup("WEBSUB_CALLBACK_BASE") {
            config.callback_base = Url::parse(base.trim()).map_err(|e| {
                SubscriberError::InvalidConfig(format!("WEBSUB_CALLBACK_BASE {:?}: {}", base, e))
            })?;
        }

        if let Some(secs) = lookup("WEBSUB_REQUEST_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.request_timeout = Duration::from_secs(secs);
        }

        config.default_lease_seconds = lookup("WEBSUB_LEASE_SECONDS").and_then(|s| s.parse().ok());

        Ok(config)
    }

    /// Callback base with any trailing slash removed.
    pub fn callback_prefix(&self) -> &str {
        self.callback_base.as_str().trim_end_matches('/')
    }
}

fn localhost_base(port: u16) -> Url {
    Url::parse(&format!("http://localhost:{}", port)).expect("localhost URL with numeric port")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = SubscriberConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.callback_prefix(), "http://localhost:4000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.default_lease_seconds, None);
    }

    #[test]
    fn test_reads_all_vars() {
        let config = SubscriberConfig::from_lookup(lookup(&[
            ("WEBSUB_PORT", "9090"),
            ("WEBSUB_BIND_ADDRESS", "127.0.0.1"),
            ("WEBSUB_CALLBACK_BASE", "https://subscriber.example.com/websub/"),
            ("WEBSUB_REQUEST_TIMEOUT_SECS", "5"),
            ("WEBSUB_LEASE_SECONDS", "86400"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            config.callback_prefix(),
            "https://subscriber.example.com/websub"
        );
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.default_lease_seconds, Some(86400));
    }

    #[test]
    fn test_callback_base_follows_port() {
        let config = SubscriberConfig::from_lookup(lookup(&[("WEBSUB_PORT", "8123")])).unwrap();
        assert_eq!(config.callback_prefix(), "http://localhost:8123");
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = SubscriberConfig::from_lookup(lookup(&[
            ("WEBSUB_PORT", "not-a-number"),
            ("WEBSUB_REQUEST_TIMEOUT_SECS", "soon"),
            ("WEBSUB_LEASE_SECONDS", "forever"),
        ]))
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.default_lease_seconds, None);
    }

    #[test]
    fn test_invalid_callback_base_is_an_error() {
        let result =
            SubscriberConfig::from_lookup(lookup(&[("WEBSUB_CALLBACK_BASE", "not a url")]));
        assert!(matches!(result, Err(SubscriberError::InvalidConfig(_))));
    }
}
