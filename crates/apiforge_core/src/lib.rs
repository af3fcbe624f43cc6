//! # apiforge_core
//!
//! Metadata-driven API runtime: entity shapes and operations are declared
//! through an explicit registration API, frozen into an immutable
//! [`Schema`], and served by a [`Dispatcher`] that coerces arguments, awaits
//! handlers, and shapes results field-by-field.
//!
//! This crate provides:
//!
//! - [`SchemaRegistry`] / [`Schema`]: shape and operation registration with
//!   build-time reference validation.
//! - [`EntityShape`] / [`Entity`]: stored and computed fields, instances.
//! - [`Operation`]: Read, Write and EventSource declarations.
//! - [`Dispatcher`]: request-time lookup, coercion, invocation, shaping.
//! - [`Broker`]: topic-keyed fan-out to live [`Subscription`]s.
//! - [`IdGenerator`]: the id-generation capability used by shapes.

pub mod args;
pub mod broker;
pub mod coerce;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod id;
pub mod operation;
pub mod registry;
pub mod shape;
pub mod shaping;
pub mod types;

pub use args::Args;
pub use broker::{
    Broker, DeliveryObserver, Subscription, SubscriptionHandle, SubscriptionId,
    SubscriptionState, TracingObserver,
};
pub use config::{ArgumentPolicy, DispatchConfig};
pub use context::RequestContext;
pub use dispatcher::Dispatcher;
pub use entity::{Entity, Resolved};
pub use error::{BrokerError, DeliveryError, DispatchError, SchemaError, ShapeError};
pub use id::{IdGenerator, RandomHexId, SequentialId};
pub use operation::{ArgDef, Handler, Operation, OperationKind};
pub use registry::{Schema, SchemaRegistry};
pub use shape::{EntityShape, FieldDef, FieldKind};
pub use types::{Scalar, TypeExpr};
