//! Error types for registration, dispatch and delivery.
//!
//! Registry errors ([`SchemaError`]) are fatal at startup. Dispatch errors
//! ([`DispatchError`]) are scoped to one request. Delivery errors
//! ([`DeliveryError`]) are scoped to one subscriber and are only ever
//! reported to a [`DeliveryObserver`](crate::DeliveryObserver).

use std::time::Duration;

use thiserror::Error;

use crate::operation::OperationKind;

/// Errors raised while declaring shapes and operations or building the
/// schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate entity shape: {0}")]
    DuplicateShape(String),

    #[error("duplicate {kind} operation: {name}")]
    DuplicateOperation { kind: OperationKind, name: String },

    #[error("'{owner}' references unregistered entity shape '{type_name}'")]
    UnresolvedReference { owner: String, type_name: String },

    #[error("duplicate field '{field}' on shape '{shape}'")]
    DuplicateField { shape: String, field: String },

    #[error("duplicate argument '{argument}' on operation '{operation}'")]
    DuplicateArgument { operation: String, argument: String },

    #[error("computed field '{field}' on shape '{shape}' cannot be assigned")]
    ComputedFieldAssignment { shape: String, field: String },

    #[error("shape '{shape}' has no field '{field}'")]
    UnknownField { shape: String, field: String },

    #[error("required field '{field}' missing for shape '{shape}'")]
    MissingField { shape: String, field: String },

    #[error("event source '{0}' is not bound to any topic")]
    EmptyTopicBinding(String),
}

/// A handler result that does not fit the declared return type.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("no entity shape named '{0}'")]
    UnknownShape(String),

    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },
}

/// Errors raised by the subscription broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("event source '{event_source}' is not bound to topic '{topic}'")]
    UnknownTopicBinding { event_source: String, topic: String },
}

/// Errors raised while serving a single operation request.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown {kind} operation: {name}")]
    UnknownOperation { kind: OperationKind, name: String },

    #[error("invalid argument '{argument}': {reason}")]
    ArgumentType { argument: String, reason: String },

    /// The bound handler failed; `source` is the handler's own error.
    #[error("handler for '{operation}' failed: {source}")]
    Handler {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("result of '{operation}' does not match its declared type: {source}")]
    ResultShape {
        operation: String,
        #[source]
        source: ShapeError,
    },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A failure transforming or delivering one event to one subscriber.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transform failed: {0}")]
    Transform(#[source] anyhow::Error),

    #[error("transformed event does not match the declared type: {0}")]
    Shape(#[from] ShapeError),

    #[error("subscriber disconnected")]
    Disconnected,
}
