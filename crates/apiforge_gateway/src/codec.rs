//! JSON codec helpers.
//!
//! Request and response bodies are JSON so any NATS client can talk to the
//! gateway without a schema-specific encoder.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Encode a value to JSON bytes.
///
/// # Errors
///
/// Returns [`GatewayError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, GatewayError> {
    serde_json::to_vec(value).map_err(GatewayError::Encode)
}

/// Decode a value from JSON bytes.
///
/// # Errors
///
/// Returns [`GatewayError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(bytes).map_err(GatewayError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Unsubscribe {
        subscription_id: u64,
    }

    #[test]
    fn test_decode_request_body() {
        let msg: Unsubscribe = decode(br#"{"subscription_id": 7}"#).unwrap();
        assert_eq!(msg, Unsubscribe { subscription_id: 7 });
        assert_eq!(encode(&msg).unwrap(), br#"{"subscription_id":7}"#.to_vec());
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<Unsubscribe, _> = decode(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(GatewayError::Decode(_))));
    }
}
