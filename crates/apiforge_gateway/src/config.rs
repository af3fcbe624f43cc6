//! Gateway configuration.

use crate::connection::{DEFAULT_NATS_URL, NATS_URL_ENV};
use crate::subjects::DEFAULT_PREFIX;

/// Where the gateway connects and which subject prefix it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// NATS server URL.
    pub nats_url: String,
    /// Subject prefix all API subjects live under.
    pub prefix: String,
}

impl GatewayConfig {
    /// Configuration from the `NATS_URL` environment variable, falling back
    /// to [`DEFAULT_NATS_URL`], with the default prefix.
    #[must_use]
    pub fn from_env() -> Self {
        let nats_url = std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string());
        Self {
            nats_url,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Override the NATS URL.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = url.into();
        self
    }

    /// Override the subject prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}
