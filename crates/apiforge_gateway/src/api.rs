//! NATS API handler: serves a [`Dispatcher`] over request/reply subjects.
//!
//! Subjects (all under configurable prefix, default "api"):
//!
//!   Request/Reply:
//!     {prefix}.read.{name}  : invoke a Read operation, body is the args object
//!     {prefix}.write.{name} : invoke a Write operation, body is the args object
//!     {prefix}.subscribe    : attach to an EventSource
//!     {prefix}.unsubscribe  : detach a subscription
//!     {prefix}.schema       : get schema description
//!
//!   Publish:
//!     {prefix}.events.{id}  : shaped events for one subscription
use std::sync::Arc;

use apiforge_core::{Dispatcher, OperationKind, Subscription, SubscriptionHandle};
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::connection::NatsConnection;
use crate::error::GatewayError;
use crate::messages::{
    ApiResponse, SubscribeRequest, SubscribeResponse, UnsubscribeRequest, UnsubscribeResponse,
};
use crate::subjects::{self, Route};

/// Live remote subscriptions keyed by subscription id.
pub type SubscriptionTable = DashMap<u64, SubscriptionHandle>;

#[derive(Clone)]
pub struct Gateway {
    dispatcher: Dispatcher,
    connection: NatsConnection,
    prefix: String,
    subscriptions: Arc<SubscriptionTable>,
}

impl Gateway {
    pub fn new(dispatcher: Dispatcher, connection: NatsConnection, prefix: impl Into<String>) -> Self {
        Self {
            dispatcher,
            connection,
            prefix: prefix.into(),
            subscriptions: Arc::default(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of remote subscriptions currently forwarding events.
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// Serve requests until the NATS subscription closes. Each request is
    /// handled on its own task so a slow handler never blocks the loop.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Subscribe`] if the wildcard subscription
    /// cannot be created.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let subject = subjects::wildcard(&self.prefix);
        info!(subject = %subject, "subscribing to API subjects");
        let mut sub = self.connection.subscribe(&subject).await?;

        self.log_routes();
        info!("gateway ready, listening for requests");

        while let Some(msg) = sub.next().await {
            let gateway = self.clone();
            tokio::spawn(async move { gateway.handle_message(msg).await });
        }

        info!("request subscription closed; detaching remote subscribers");
        self.detach_all();
        Ok(())
    }

    /// Log every subject the gateway answers on.
    fn log_routes(&self) {
        let schema = self.dispatcher.schema();
        for kind in [OperationKind::Read, OperationKind::Write] {
            for operation in schema.operations(kind) {
                debug!(subject = %subjects::invoke(&self.prefix, kind, operation.name()), "serving");
            }
        }
        info!(
            subscribe = %subjects::subscribe(&self.prefix),
            unsubscribe = %subjects::unsubscribe(&self.prefix),
            schema = %subjects::schema(&self.prefix),
            "control subjects"
        );
    }

    async fn handle_message(&self, msg: async_nats::Message) {
        let subject = msg.subject.as_str();
        let response = match subjects::parse(&self.prefix, subject) {
            Some(Route::Events) => return,
            Some(Route::Invoke(kind, name)) => {
                debug!(%kind, operation = name, "received request");
                handle_invoke(&self.dispatcher, kind, name, &msg.payload).await
            }
            Some(Route::Subscribe) => self.handle_subscribe(&msg.payload),
            Some(Route::Unsubscribe) => {
                handle_unsubscribe(&self.dispatcher, &self.subscriptions, &msg.payload)
            }
            Some(Route::Schema) => ApiResponse::ok(self.dispatcher.schema().to_json()),
            None => {
                warn!(subject, "unroutable subject");
                ApiResponse::bad_request(format!("unroutable subject: {subject}"))
            }
        };

        if let Some(reply_to) = msg.reply {
            if let Err(e) = self
                .connection
                .publish_bytes(reply_to.as_str(), response.to_bytes())
                .await
            {
                error!(%e, "failed to publish reply");
            }
        }
    }

    fn handle_subscribe(&self, payload: &[u8]) -> ApiResponse {
        let subscription = match open_subscription(&self.dispatcher, payload) {
            Ok(subscription) => subscription,
            Err(response) => return response,
        };

        let handle = subscription.handle().clone();
        let id = handle.id();
        let subject = subjects::events(&self.prefix, id);
        info!(
            subscription = %id,
            source = handle.source(),
            topic = handle.topic(),
            subject = %subject,
            "remote subscription attached"
        );
        self.subscriptions.insert(id.0, handle);

        let response = SubscribeResponse {
            subscription_id: id.0,
            subject: subject.clone(),
        };
        tokio::spawn(forward_events(
            subscription,
            self.connection.clone(),
            subject,
            Arc::clone(&self.subscriptions),
        ));

        match serde_json::to_value(response) {
            Ok(body) => ApiResponse::ok(body),
            Err(e) => ApiResponse::error("internal", e.to_string()),
        }
    }

    fn detach_all(&self) {
        let ids: Vec<u64> = self.subscriptions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, handle)) = self.subscriptions.remove(&id) {
                self.dispatcher.unsubscribe(&handle);
            }
        }
    }
}

/// Publish every event a subscription yields to its events subject. Ends
/// when the subscription is detached.
async fn forward_events(
    mut subscription: Subscription,
    connection: NatsConnection,
    subject: String,
    table: Arc<SubscriptionTable>,
) {
    while let Some(event) = subscription.recv().await {
        if let Err(e) = connection.publish(&subject, &event).await {
            warn!(%e, subject = %subject, "failed to forward event");
        }
    }
    table.remove(&subscription.handle().id().0);
    debug!(subscription = %subscription.handle().id(), "event forwarding stopped");
}

/// Invoke a Read or Write operation with a JSON argument body. An empty body
/// means no arguments.
pub async fn handle_invoke(
    dispatcher: &Dispatcher,
    kind: OperationKind,
    name: &str,
    payload: &[u8],
) -> ApiResponse {
    let args = match decode_args(payload) {
        Ok(args) => args,
        Err(response) => return response,
    };
    match dispatcher.invoke(kind, name, args, dispatcher.context()).await {
        Ok(value) => ApiResponse::ok(value),
        Err(err) => {
            warn!(%kind, operation = name, error = %err, "request failed");
            ApiResponse::from(&err)
        }
    }
}

fn decode_args(payload: &[u8]) -> Result<Map<String, Value>, ApiResponse> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match codec::decode::<Value>(payload) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(other) => Err(ApiResponse::bad_request(format!(
            "arguments must be a JSON object, found {other}"
        ))),
        Err(e) => Err(ApiResponse::bad_request(e.to_string())),
    }
}

/// Attach to the EventSource a subscribe body names. Without an explicit
/// topic the source's first bound topic is used.
pub fn open_subscription(dispatcher: &Dispatcher, payload: &[u8]) -> Result<Subscription, ApiResponse> {
    let request: SubscribeRequest =
        codec::decode(payload).map_err(|e| ApiResponse::bad_request(e.to_string()))?;

    let topic = match request.topic {
        Some(topic) => topic,
        None => dispatcher
            .schema()
            .operation(OperationKind::EventSource, &request.source)
            .and_then(|source| source.topics().first().cloned())
            .unwrap_or_default(),
    };

    dispatcher
        .subscribe(&request.source, &topic)
        .map_err(|err| ApiResponse::from(&err))
}

/// Detach the subscription an unsubscribe body names. Unknown ids reply
/// `{"detached": false}`.
pub fn handle_unsubscribe(
    dispatcher: &Dispatcher,
    table: &SubscriptionTable,
    payload: &[u8],
) -> ApiResponse {
    let request: UnsubscribeRequest = match codec::decode(payload) {
        Ok(request) => request,
        Err(e) => return ApiResponse::bad_request(e.to_string()),
    };
    let detached = match table.remove(&request.subscription_id) {
        Some((_, handle)) => dispatcher.unsubscribe(&handle),
        None => false,
    };
    info!(subscription = request.subscription_id, detached, "remote unsubscribe");
    match serde_json::to_value(UnsubscribeResponse { detached }) {
        Ok(body) => ApiResponse::ok(body),
        Err(e) => ApiResponse::error("internal", e.to_string()),
    }
}
