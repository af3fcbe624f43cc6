//! Subscription broker: topic-keyed fan-out of published events.
//!
//! Every [`Subscription`] owns a FIFO queue and a delivery worker task. A
//! publish snapshots the live subscriptions on its topic and enqueues the
//! payload to each; the worker then runs the EventSource transform, shapes
//! the result against the source's return type and hands it to the
//! subscriber's stream.
//!
//! ```text
//! publish(topic, payload)
//!     └─► topics[topic] ──┬─► [queue S1] ──► worker ──► transform ─► shape ─► stream S1
//!                         └─► [queue S2] ──► worker ──► transform ─► shape ─► stream S2
//! ```
//!
//! ## Guarantees
//!
//! - Per subscription, payloads are delivered in publish order.
//! - A slow or failing transform only affects its own subscription; failures
//!   are reported to the [`DeliveryObserver`], never to the publisher.
//! - The topic map is locked only for the attach/detach/enqueue instant,
//!   never across a transform.
//! - After detach (unsubscribe, dropped stream, or [`Broker::shutdown`]) no
//!   further delivery is attempted. Nothing is buffered for late joiners.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::entity::Resolved;
use crate::error::{BrokerError, DeliveryError};
use crate::operation::{Operation, TransformFn};
use crate::registry::Schema;
use crate::shaping;
use crate::types::TypeExpr;

const ATTACHED: u8 = 0;
const DELIVERING: u8 = 1;
const DETACHED: u8 = 2;

/// Broker-unique subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a subscription. `Detached` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered; no matching publish yet.
    Attached,
    /// At least one payload has been published to it.
    Delivering,
    /// Released; no further deliveries.
    Detached,
}

impl SubscriptionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            ATTACHED => SubscriptionState::Attached,
            DELIVERING => SubscriptionState::Delivering,
            _ => SubscriptionState::Detached,
        }
    }
}

/// Identifies one live binding for [`Broker::unsubscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    topic: String,
    source: String,
}

impl SubscriptionHandle {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Name of the EventSource feeding this subscription.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Receives per-subscriber delivery failures.
pub trait DeliveryObserver: Send + Sync {
    fn delivery_failed(&self, handle: &SubscriptionHandle, error: &DeliveryError);
}

/// Logs delivery failures at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn delivery_failed(&self, handle: &SubscriptionHandle, error: &DeliveryError) {
        warn!(
            subscription = %handle.id,
            topic = handle.topic,
            source = handle.source,
            %error,
            "event delivery failed"
        );
    }
}

/// A live subscription: its handle plus the stream of shaped events.
///
/// Dropping the subscription detaches it from the broker.
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    state: Arc<AtomicU8>,
    events: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    #[must_use]
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Wait for the next event. Returns `None` once the subscription has been
    /// detached and all delivered events are consumed.
    pub async fn recv(&mut self) -> Option<Value> {
        self.events.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.events.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.events.poll_recv(cx)
    }
}

/// One attached subscriber as seen from the topic map.
struct Slot {
    id: SubscriptionId,
    queue: mpsc::UnboundedSender<Resolved>,
    state: Arc<AtomicU8>,
}

impl Slot {
    fn release(&self) {
        self.state.store(DETACHED, Ordering::Release);
    }
}

struct BrokerInner {
    schema: Arc<Schema>,
    topics: DashMap<String, Vec<Slot>>,
    next_id: AtomicU64,
    observer: Arc<dyn DeliveryObserver>,
}

impl BrokerInner {
    /// Remove a slot from the topic map, dropping the topic entry once empty.
    fn detach(&self, topic: &str, id: SubscriptionId) -> bool {
        let removed = match self.topics.get_mut(topic) {
            Some(mut slots) => match slots.iter().position(|s| s.id == id) {
                Some(pos) => {
                    slots.remove(pos).release();
                    true
                }
                None => false,
            },
            None => false,
        };
        self.topics.remove_if(topic, |_, slots| slots.is_empty());
        removed
    }
}

/// Topic-keyed publish/subscribe bus. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("topics", &self.inner.topics.len())
            .finish_non_exhaustive()
    }
}

impl Broker {
    /// Create a broker that shapes events against `schema` and logs delivery
    /// failures through [`TracingObserver`].
    #[must_use]
    pub fn new(schema: Arc<Schema>) -> Self {
        Self::with_observer(schema, Arc::new(TracingObserver))
    }

    /// Create a broker reporting delivery failures to `observer`.
    #[must_use]
    pub fn with_observer(schema: Arc<Schema>, observer: Arc<dyn DeliveryObserver>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                schema,
                topics: DashMap::new(),
                next_id: AtomicU64::new(1),
                observer,
            }),
        }
    }

    /// Attach a subscriber to `topic` through the EventSource `source`.
    ///
    /// Spawns the subscription's delivery worker, so this must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UnknownTopicBinding`] if `source` is not an
    /// EventSource bound to `topic`.
    pub fn subscribe(&self, topic: &str, source: &Operation) -> Result<Subscription, BrokerError> {
        let transform = match source.transform() {
            Some(transform) if source.is_bound_to(topic) => transform.clone(),
            _ => {
                return Err(BrokerError::UnknownTopicBinding {
                    event_source: source.name().to_string(),
                    topic: topic.to_string(),
                });
            }
        };

        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = SubscriptionHandle {
            id,
            topic: topic.to_string(),
            source: source.name().to_string(),
        };
        let state = Arc::new(AtomicU8::new(ATTACHED));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Slot {
                id,
                queue: queue_tx,
                state: Arc::clone(&state),
            });

        let worker = Worker {
            broker: Arc::downgrade(&self.inner),
            schema: Arc::clone(&self.inner.schema),
            observer: Arc::clone(&self.inner.observer),
            handle: handle.clone(),
            transform,
            returns: source.returns().clone(),
            state: Arc::clone(&state),
        };
        tokio::spawn(worker.run(queue_rx, events_tx));

        info!(subscription = %id, topic, source = source.name(), "subscription attached");

        Ok(Subscription {
            handle,
            state,
            events: events_rx,
        })
    }

    /// Queue `payload` for every live subscription on `topic`.
    ///
    /// Returns the number of subscriptions reached. Never fails: delivery
    /// problems surface through the [`DeliveryObserver`].
    pub fn publish(&self, topic: &str, payload: impl Into<Resolved>) -> usize {
        let payload = payload.into();
        let Some(slots) = self.inner.topics.get(topic) else {
            debug!(topic, "publish without subscribers");
            return 0;
        };

        let mut reached = 0;
        for slot in slots.iter() {
            if slot.queue.send(payload.clone()).is_ok() {
                let _ = slot.state.compare_exchange(
                    ATTACHED,
                    DELIVERING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                reached += 1;
            }
        }
        debug!(topic, reached, "event published");
        reached
    }

    /// Detach a subscription. Idempotent: returns `true` only for the call
    /// that actually detached it.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let detached = self.inner.detach(&handle.topic, handle.id);
        if detached {
            info!(subscription = %handle.id, topic = handle.topic, "subscription detached");
        }
        detached
    }

    /// Current state of the subscription behind `handle`.
    #[must_use]
    pub fn state(&self, handle: &SubscriptionHandle) -> SubscriptionState {
        self.inner
            .topics
            .get(&handle.topic)
            .and_then(|slots| {
                slots
                    .iter()
                    .find(|s| s.id == handle.id)
                    .map(|s| SubscriptionState::from_raw(s.state.load(Ordering::Acquire)))
            })
            .unwrap_or(SubscriptionState::Detached)
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.topics.get(topic).map_or(0, |slots| slots.len())
    }

    /// Topics with at least one live subscription.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.inner.topics.iter().map(|e| e.key().clone()).collect()
    }

    /// Detach every subscription. Subscriber streams end once their
    /// in-flight delivery completes.
    pub fn shutdown(&self) {
        let mut detached = 0;
        self.inner.topics.retain(|_, slots| {
            for slot in slots.iter() {
                slot.release();
            }
            detached += slots.len();
            false
        });
        info!(detached, "broker shut down");
    }
}

/// Delivery loop for one subscription.
struct Worker {
    broker: Weak<BrokerInner>,
    schema: Arc<Schema>,
    observer: Arc<dyn DeliveryObserver>,
    handle: SubscriptionHandle,
    transform: TransformFn,
    returns: TypeExpr,
    state: Arc<AtomicU8>,
}

impl Worker {
    async fn run(
        self,
        mut queue: mpsc::UnboundedReceiver<Resolved>,
        events: mpsc::UnboundedSender<Value>,
    ) {
        loop {
            let payload = tokio::select! {
                biased;
                () = events.closed() => {
                    debug!(subscription = %self.handle.id, "subscriber disconnected");
                    break;
                }
                next = queue.recv() => match next {
                    Some(payload) => payload,
                    None => break,
                },
            };

            if self.state.load(Ordering::Acquire) == DETACHED {
                break;
            }

            match self.deliver(payload).await {
                Ok(value) => {
                    if events.send(value).is_err() {
                        self.observer
                            .delivery_failed(&self.handle, &DeliveryError::Disconnected);
                        break;
                    }
                }
                Err(error) => self.observer.delivery_failed(&self.handle, &error),
            }
        }

        if let Some(broker) = self.broker.upgrade() {
            broker.detach(&self.handle.topic, self.handle.id);
        }
        self.state.store(DETACHED, Ordering::Release);
    }

    async fn deliver(&self, payload: Resolved) -> Result<Value, DeliveryError> {
        let transformed = (self.transform)(payload)
            .await
            .map_err(DeliveryError::Transform)?;
        Ok(shaping::shape(&self.schema, &self.returns, transformed)?)
    }
}
