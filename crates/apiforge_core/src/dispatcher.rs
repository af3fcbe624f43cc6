//! Resolver dispatcher: serves operation requests against a frozen schema.
//!
//! For each request the dispatcher:
//!
//! 1. Looks up the operation by `(kind, name)`.
//! 2. Coerces the raw arguments against the declared argument types.
//! 3. Awaits the bound handler (Write handlers also receive the request
//!    context), optionally under a timeout.
//! 4. Shapes the result against the declared return type.
//!
//! Handler failures pass through unchanged as [`DispatchError::Handler`];
//! the dispatcher never retries.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{Instrument, debug, debug_span};

use crate::broker::{Broker, Subscription, SubscriptionHandle};
use crate::coerce;
use crate::config::DispatchConfig;
use crate::context::RequestContext;
use crate::error::DispatchError;
use crate::operation::{Handler, OperationKind};
use crate::registry::Schema;
use crate::shaping;

/// Dispatches operation requests and subscription requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    schema: Arc<Schema>,
    broker: Broker,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a dispatcher with its own broker.
    #[must_use]
    pub fn new(schema: Arc<Schema>, config: DispatchConfig) -> Self {
        let broker = Broker::new(Arc::clone(&schema));
        Self::with_broker(schema, broker, config)
    }

    /// Create a dispatcher publishing through an existing broker.
    #[must_use]
    pub fn with_broker(schema: Arc<Schema>, broker: Broker, config: DispatchConfig) -> Self {
        Self {
            schema,
            broker,
            config,
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// A fresh request context bound to this dispatcher's broker.
    #[must_use]
    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.broker.clone())
    }

    /// Invoke a Read or Write operation and return its shaped result.
    ///
    /// The context is only handed to Write handlers.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownOperation`] if no such operation exists
    ///   (EventSources cannot be invoked; subscribe to them instead).
    /// - [`DispatchError::ArgumentType`] if argument coercion fails.
    /// - [`DispatchError::Handler`] if the handler fails.
    /// - [`DispatchError::Timeout`] if a configured timeout elapses.
    /// - [`DispatchError::ResultShape`] if the result does not fit the
    ///   declared return type.
    pub async fn invoke(
        &self,
        kind: OperationKind,
        name: &str,
        raw_args: Map<String, Value>,
        context: RequestContext,
    ) -> Result<Value, DispatchError> {
        let unknown = || DispatchError::UnknownOperation {
            kind,
            name: name.to_string(),
        };
        let operation = self.schema.operation(kind, name).ok_or_else(unknown)?;
        let args =
            coerce::coerce_args(&self.schema, operation, raw_args, self.config.argument_policy)?;

        let span = debug_span!(
            "invoke",
            %kind,
            operation = name,
            request_id = %context.request_id()
        );

        async move {
            let pending = match operation.handler() {
                Handler::Read(handler) => handler(args),
                Handler::Write(handler) => handler(args, context),
                Handler::EventSource { .. } => return Err(unknown()),
            };

            let outcome = match self.config.handler_timeout {
                Some(limit) => tokio::time::timeout(limit, pending).await.map_err(|_| {
                    DispatchError::Timeout {
                        operation: name.to_string(),
                        after: limit,
                    }
                })?,
                None => pending.await,
            };
            let resolved = outcome.map_err(|source| DispatchError::Handler {
                operation: name.to_string(),
                source,
            })?;

            debug!(result = resolved.kind_name(), "handler completed");
            shaping::shape(&self.schema, operation.returns(), resolved).map_err(|source| {
                DispatchError::ResultShape {
                    operation: name.to_string(),
                    source,
                }
            })
        }
        .instrument(span)
        .await
    }

    /// Attach a subscriber to `topic` through the EventSource named
    /// `source`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownOperation`] if no such EventSource exists.
    /// - [`DispatchError::Broker`] if the source is not bound to `topic`.
    pub fn subscribe(&self, source: &str, topic: &str) -> Result<Subscription, DispatchError> {
        let operation = self
            .schema
            .operation(OperationKind::EventSource, source)
            .ok_or_else(|| DispatchError::UnknownOperation {
                kind: OperationKind::EventSource,
                name: source.to_string(),
            })?;
        Ok(self.broker.subscribe(topic, operation)?)
    }

    /// Detach a subscription. Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.broker.unsubscribe(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use anyhow::anyhow;
    use serde_json::json;

    use super::*;
    use crate::entity::Resolved;
    use crate::error::BrokerError;
    use crate::id::SequentialId;
    use crate::operation::Operation;
    use crate::registry::SchemaRegistry;
    use crate::shape::EntityShape;
    use crate::types::TypeExpr;

    #[derive(Debug, thiserror::Error)]
    #[error("store offline")]
    struct StoreOffline;

    fn dispatcher(config: DispatchConfig, calls: Arc<AtomicUsize>) -> Dispatcher {
        let mut registry = SchemaRegistry::new();
        registry
            .register_shape(
                EntityShape::new("Item")
                    .stored("label", TypeExpr::string())
                    .id_field("id"),
            )
            .unwrap();

        let counted = Arc::clone(&calls);
        registry
            .register_operation(
                Operation::read("item", TypeExpr::optional(TypeExpr::entity("Item")), move |args| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    let label = args.get("label").cloned();
                    async move {
                        let Some(label) = label else { return Ok(Resolved::Null) };
                        if label == json!("missing") {
                            return Ok(Resolved::Null);
                        }
                        let values = json!({ "label": label }).as_object().cloned().unwrap();
                        let shape = EntityShape::new("Item")
                            .stored("label", TypeExpr::string())
                            .id_field("id");
                        Ok(shape.instantiate(values, &SequentialId::new("i"))?.into())
                    }
                })
                .arg("label", TypeExpr::string()),
            )
            .unwrap();
        registry
            .register_operation(Operation::read("broken", TypeExpr::int(), |_| async {
                Err(anyhow::Error::new(StoreOffline))
            }))
            .unwrap();
        registry
            .register_operation(Operation::read("slow", TypeExpr::int(), |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Resolved::Value(json!(1)))
            }))
            .unwrap();
        registry
            .register_operation(Operation::read("lies", TypeExpr::int(), |_| async {
                Ok(Resolved::List(vec![]))
            }))
            .unwrap();
        registry
            .register_operation(Operation::read("count", TypeExpr::int(), |_| async {
                Ok(json!("not a number").into())
            }))
            .unwrap();
        registry
            .register_operation(Operation::read(
                "tags",
                TypeExpr::list(TypeExpr::string()),
                |_| async { Ok(json!(["a", "b"]).into()) },
            ))
            .unwrap();
        registry
            .register_operation(
                Operation::write("announce", TypeExpr::int(), |args, ctx| async move {
                    let text = args.str("text")?.to_string();
                    let reached = ctx.publish("NEWS", json!(text));
                    Ok(Resolved::Value(json!(reached)))
                })
                .arg("text", TypeExpr::string()),
            )
            .unwrap();
        registry
            .register_operation(Operation::event_source(
                "news",
                TypeExpr::string(),
                ["NEWS"],
                |payload| async move {
                    match payload {
                        Resolved::Value(v) => Ok(Resolved::Value(json!(format!(
                            "news: {}",
                            v.as_str().ok_or_else(|| anyhow!("not text"))?
                        )))),
                        other => Ok(other),
                    }
                },
            ))
            .unwrap();

        Dispatcher::new(Arc::new(registry.build().unwrap()), config)
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_read_is_shaped() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        let out = d
            .invoke(OperationKind::Read, "item", args(json!({"label": "a"})), d.context())
            .await
            .unwrap();
        assert_eq!(out, json!({"label": "a", "id": "i1"}));
    }

    #[tokio::test]
    async fn test_null_result() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        let out = d
            .invoke(OperationKind::Read, "item", args(json!({"label": "missing"})), d.context())
            .await
            .unwrap();
        assert_eq!(out, Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_operation_never_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let d = dispatcher(DispatchConfig::default(), Arc::clone(&calls));

        let err = d
            .invoke(OperationKind::Write, "item", Map::new(), d.context())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnknownOperation { kind: OperationKind::Write, .. }
        ));

        let err = d
            .invoke(OperationKind::EventSource, "news", Map::new(), d.context())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownOperation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_argument_error_never_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let d = dispatcher(DispatchConfig::default(), Arc::clone(&calls));
        let err = d
            .invoke(OperationKind::Read, "item", args(json!({"label": 3})), d.context())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentType { argument, .. } if argument == "label"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_strict_policy() {
        let d = dispatcher(DispatchConfig::new().strict(), Arc::default());
        let err = d
            .invoke(
                OperationKind::Read,
                "item",
                args(json!({"label": "a", "extra": 1})),
                d.context(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentType { argument, .. } if argument == "extra"));
    }

    #[tokio::test]
    async fn test_handler_error_keeps_cause() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        let err = d
            .invoke(OperationKind::Read, "broken", Map::new(), d.context())
            .await
            .unwrap_err();
        match err {
            DispatchError::Handler { operation, source } => {
                assert_eq!(operation, "broken");
                assert!(source.downcast_ref::<StoreOffline>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let d = dispatcher(
            DispatchConfig::new().with_timeout(Duration::from_millis(20)),
            Arc::default(),
        );
        let err = d
            .invoke(OperationKind::Read, "slow", Map::new(), d.context())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { operation, .. } if operation == "slow"));
    }

    #[tokio::test]
    async fn test_result_shape_mismatch() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        let err = d
            .invoke(OperationKind::Read, "lies", Map::new(), d.context())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ResultShape { .. }));
    }

    #[tokio::test]
    async fn test_scalar_result_must_fit_declared_type() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        let err = d
            .invoke(OperationKind::Read, "count", Map::new(), d.context())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ResultShape { operation, .. } if operation == "count"));
    }

    #[tokio::test]
    async fn test_json_array_result_for_scalar_list() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        let out = d
            .invoke(OperationKind::Read, "tags", Map::new(), d.context())
            .await
            .unwrap();
        assert_eq!(out, json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_write_publishes_to_subscribers() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        let mut sub = d.subscribe("news", "NEWS").unwrap();

        let out = d
            .invoke(OperationKind::Write, "announce", args(json!({"text": "hi"})), d.context())
            .await
            .unwrap();
        assert_eq!(out, json!(1));

        let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, json!("news: hi"));
        assert!(d.unsubscribe(sub.handle()));
        assert!(!d.unsubscribe(sub.handle()));
    }

    #[tokio::test]
    async fn test_subscribe_errors() {
        let d = dispatcher(DispatchConfig::default(), Arc::default());
        assert!(matches!(
            d.subscribe("nope", "NEWS"),
            Err(DispatchError::UnknownOperation { kind: OperationKind::EventSource, .. })
        ));
        assert!(matches!(
            d.subscribe("news", "SPORTS"),
            Err(DispatchError::Broker(BrokerError::UnknownTopicBinding { .. }))
        ));
    }
}
