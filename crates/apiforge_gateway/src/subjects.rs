//! NATS subject hierarchy.
//!
//! All API subjects live under a configurable prefix (default `api`):
//!
//! ```text
//! {prefix}.read.<operation>     request/reply: invoke a Read operation
//! {prefix}.write.<operation>    request/reply: invoke a Write operation
//! {prefix}.subscribe            request/reply: attach to an EventSource
//! {prefix}.unsubscribe          request/reply: detach a subscription
//! {prefix}.schema               request/reply: schema description
//! {prefix}.events.<id>          publish      : events for one subscription
//! ```

use apiforge_core::{OperationKind, SubscriptionId};

/// Default subject prefix.
pub const DEFAULT_PREFIX: &str = "api";

/// Wildcard covering every subject under `prefix`.
#[must_use]
pub fn wildcard(prefix: &str) -> String {
    format!("{prefix}.>")
}

/// `{prefix}.read.<name>` or `{prefix}.write.<name>`.
///
/// EventSources are not invocable; they map to the subscribe subject.
#[must_use]
pub fn invoke(prefix: &str, kind: OperationKind, name: &str) -> String {
    match kind {
        OperationKind::EventSource => subscribe(prefix),
        kind => format!("{prefix}.{kind}.{name}"),
    }
}

#[must_use]
pub fn subscribe(prefix: &str) -> String {
    format!("{prefix}.subscribe")
}

#[must_use]
pub fn unsubscribe(prefix: &str) -> String {
    format!("{prefix}.unsubscribe")
}

#[must_use]
pub fn schema(prefix: &str) -> String {
    format!("{prefix}.schema")
}

/// `{prefix}.events.<id>`
#[must_use]
pub fn events(prefix: &str, id: SubscriptionId) -> String {
    format!("{prefix}.events.{id}")
}

/// What an inbound subject asks the gateway to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Invoke(OperationKind, &'a str),
    Subscribe,
    Unsubscribe,
    Schema,
    /// The gateway's own event traffic; never answered.
    Events,
}

/// Route an inbound subject. Returns `None` for subjects outside `prefix`
/// or with an unrecognised shape.
#[must_use]
pub fn parse<'a>(prefix: &str, subject: &'a str) -> Option<Route<'a>> {
    let rest = subject.strip_prefix(prefix)?.strip_prefix('.')?;
    match rest.split_once('.') {
        Some(("read", name)) if !name.is_empty() => Some(Route::Invoke(OperationKind::Read, name)),
        Some(("write", name)) if !name.is_empty() => {
            Some(Route::Invoke(OperationKind::Write, name))
        }
        Some(("events", _)) => Some(Route::Events),
        Some(_) => None,
        None => match rest {
            "subscribe" => Some(Route::Subscribe),
            "unsubscribe" => Some(Route::Unsubscribe),
            "schema" => Some(Route::Schema),
            _ => None,
        },
    }
}
