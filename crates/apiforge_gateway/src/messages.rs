//! Request and reply bodies exchanged over the gateway subjects.
//!
//! Invocation requests carry the raw JSON argument object as their whole
//! body, so only the control subjects have dedicated request types.

use apiforge_core::DispatchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Subscriptions ───────────────────────────────────────────────────────────

/// Attach to an EventSource. Sent on `{prefix}.subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// EventSource operation name.
    pub source: String,
    /// Topic to attach to. Defaults to the source's first bound topic.
    #[serde(default)]
    pub topic: Option<String>,
}

/// Reply to a [`SubscribeRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub subscription_id: u64,
    /// Subject the shaped events are published on.
    pub subject: String,
}

/// Detach a subscription. Sent on `{prefix}.unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub subscription_id: u64,
}

/// Reply to an [`UnsubscribeRequest`]. `detached` is false when the
/// subscription was already gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub detached: bool,
}

// ── Replies ─────────────────────────────────────────────────────────────────

/// A failed request, as seen by the remote caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Envelope for every reply. Serialises as `{"ok": <value>}` or
/// `{"error": {"code", "message"}}`; a null result is `{"ok": null}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiResponse {
    Ok(Value),
    Error(ErrorBody),
}

impl ApiResponse {
    pub fn ok(value: Value) -> Self {
        Self::Ok(value)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorBody {
            code: code.into(),
            message: message.into(),
        })
    }

    /// A malformed request body or unroutable subject.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(BAD_REQUEST, message)
    }

    #[must_use]
    pub fn ok_value(&self) -> Option<&Value> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    #[must_use]
    pub fn error_body(&self) -> Option<&ErrorBody> {
        match self {
            Self::Ok(_) => None,
            Self::Error(body) => Some(body),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec())
    }
}

impl From<&DispatchError> for ApiResponse {
    fn from(err: &DispatchError) -> Self {
        Self::error(error_code(err), err.to_string())
    }
}

pub const BAD_REQUEST: &str = "bad_request";

/// Stable wire code for a dispatch failure.
#[must_use]
pub fn error_code(err: &DispatchError) -> &'static str {
    match err {
        DispatchError::UnknownOperation { .. } => "unknown_operation",
        DispatchError::ArgumentType { .. } => "argument_type",
        DispatchError::Handler { .. } => "handler",
        DispatchError::Timeout { .. } => "timeout",
        DispatchError::ResultShape { .. } => "result_shape",
        DispatchError::Broker(_) => "unknown_topic_binding",
    }
}
