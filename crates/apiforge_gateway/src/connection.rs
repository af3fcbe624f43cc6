//! NATS connection management.
//!
//! Provides a thin wrapper around `async-nats` for connecting to NATS and
//! publishing JSON bodies.

use tracing::info;

use crate::error::GatewayError;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// A wrapper around an `async-nats` client.
#[derive(Debug, Clone)]
pub struct NatsConnection {
    client: async_nats::Client,
}

impl NatsConnection {
    /// Connect to NATS at the specified URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Connect`] if the connection cannot be
    /// established.
    pub async fn connect_to(url: &str) -> Result<Self, GatewayError> {
        info!(url, "connecting to NATS");
        let client = async_nats::connect(url).await?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// Returns a reference to the underlying `async-nats` client.
    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Publish a JSON-encoded message to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if encoding or publishing fails.
    pub async fn publish<T: serde::Serialize>(
        &self,
        subject: &str,
        message: &T,
    ) -> Result<(), GatewayError> {
        let payload = crate::codec::encode(message)?;
        self.publish_bytes(subject, payload).await
    }

    /// Publish pre-encoded bytes to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Publish`] if publishing fails.
    pub async fn publish_bytes(&self, subject: &str, payload: Vec<u8>) -> Result<(), GatewayError> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await?;
        Ok(())
    }

    /// Subscribe to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Subscribe`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, GatewayError> {
        let sub = self.client.subscribe(subject.to_string()).await?;
        Ok(sub)
    }
}
