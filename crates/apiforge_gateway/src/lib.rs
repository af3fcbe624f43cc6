//! # apiforge_gateway
//!
//! NATS transport binding for an [`apiforge_core::Dispatcher`].
//!
//! This crate provides:
//!
//! - [`subjects`]: subject hierarchy builders and request routing.
//! - [`messages`]: JSON request/response bodies.
//! - [`codec`]: JSON serialisation helpers.
//! - [`connection`]: NATS connection management.
//! - [`config`]: gateway configuration.
//! - [`api`]: the request loop serving the dispatcher.
//! - [`error`]: gateway error types.

pub mod api;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod subjects;

pub use api::Gateway;
pub use codec::{decode, encode};
pub use config::GatewayConfig;
pub use connection::NatsConnection;
pub use error::GatewayError;
