//! Per-request context threaded into Write handlers.

use std::collections::HashMap;

use uuid::Uuid;

use crate::broker::Broker;
use crate::entity::Resolved;

/// Collaborators available to a Write handler for the duration of one
/// request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id of the request, for log correlation.
    request_id: Uuid,
    /// The broker Write handlers publish events through.
    broker: Broker,
    /// Transport-supplied key/value metadata.
    metadata: HashMap<String, String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(broker: Broker) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            broker,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Publish `payload` to every live subscription on `topic`.
    ///
    /// Returns the number of subscriptions the payload was queued for.
    pub fn publish(&self, topic: &str, payload: impl Into<Resolved>) -> usize {
        self.broker.publish(topic, payload)
    }
}
