//! Domain-event dispatch: fan-out to handlers and sagas, fire-and-forget.

use std::error::Error as StdError;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{DomainEvent, EventPublisher, EventRef, MessageId, MessageType};
use futures_util::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, mpsc};

use crate::channel::{Channel, Subscription};
use crate::command::CommandDispatcher;
use crate::config::BusConfig;
use crate::error::{BusError, HandlerError, HandlerPanic, MessageMismatch};
use crate::registry::{HandlerResolver, HandlerType, MessageMetadata};
use crate::saga::{self, Cursor, Saga, SagaDriver};
use crate::unhandled::{Cause, UnhandledExceptionChannel, UnhandledExceptionInfo};

/// Handles published domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventRef) -> Result<(), HandlerError>;

    /// Returns the handler name used in logs and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Recovers the concrete event inside a handler.
pub fn downcast_event<E: DomainEvent>(event: &dyn DomainEvent) -> Result<&E, HandlerError> {
    event.downcast_ref::<E>().ok_or_else(|| {
        MessageMismatch {
            expected: MessageType::of::<E>().name(),
            actual: event.event_type(),
        }
        .into()
    })
}

/// An event on the dispatcher's stream, with the number of saga hops that
/// led to it.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event: EventRef,
    pub hops: usize,
}

/// The dispatcher's own broadcast stream.
///
/// Publishing invokes the subscription callbacks synchronously; each callback
/// only enqueues work, so `publish` returns before any handler runs.
#[derive(Debug, Clone, Default)]
pub struct EventChannel {
    channel: Channel<EventEnvelope>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts `event`. Returns how many subscriptions accepted it.
    pub fn publish(&self, event: EventRef) -> usize {
        metrics::counter!("bus_events_published_total", "event" => event.event_type()).increment(1);
        let envelope = EventEnvelope {
            event,
            hops: saga::current_hops(),
        };
        tracing::trace!(
            event = envelope.event.event_type(),
            hops = envelope.hops,
            "event published"
        );
        self.channel.publish(&envelope)
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }
}

impl EventPublisher for EventChannel {
    fn publish(&self, event: EventRef) {
        EventChannel::publish(self, event);
    }
}

/// Count of queued or running deliveries.
pub(crate) struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        })
    }

    pub(crate) fn track(self: &Arc<Self>) -> InFlight {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlight {
            pending: Arc::clone(self),
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one unit of work as pending until dropped.
pub(crate) struct InFlight {
    pending: Arc<Pending>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.pending.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.pending.idle.notify_waiters();
        }
    }
}

struct Delivery {
    handler: Arc<dyn EventHandler>,
    envelope: EventEnvelope,
    _in_flight: InFlight,
}

/// Runs queued deliveries one at a time, in enqueue order.
async fn run_deliveries(
    mut queue: mpsc::UnboundedReceiver<Delivery>,
    unhandled: UnhandledExceptionChannel,
) {
    while let Some(delivery) = queue.recv().await {
        let Delivery {
            handler,
            envelope,
            _in_flight,
        } = delivery;
        let event = envelope.event;
        let outcome = saga::with_hops(
            envelope.hops,
            AssertUnwindSafe(handler.handle(Arc::clone(&event))).catch_unwind(),
        )
        .await;
        metrics::counter!("bus_event_deliveries_total", "event" => event.event_type()).increment(1);

        let exception: Option<Arc<dyn StdError + Send + Sync>> = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(Arc::from(error)),
            Err(payload) => Some(Arc::new(HandlerPanic::new(handler.name(), payload))),
        };
        if let Some(exception) = exception {
            tracing::warn!(
                handler = handler.name(),
                event = event.event_type(),
                error = %exception,
                "event handler failed"
            );
            unhandled.publish(UnhandledExceptionInfo::new(Cause::Event(event), exception));
        }
    }
    tracing::debug!("event delivery queue closed");
}

struct Inner {
    stream: EventChannel,
    publisher: RwLock<Arc<dyn EventPublisher>>,
    commands: Arc<CommandDispatcher>,
    unhandled: UnhandledExceptionChannel,
    resolver: Arc<dyn HandlerResolver>,
    metadata: Arc<dyn MessageMetadata>,
    config: BusConfig,
    queue: mpsc::UnboundedSender<Delivery>,
    pending: Arc<Pending>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for subscription in self.subscriptions.get_mut().drain(..) {
            subscription.unsubscribe();
        }
    }
}

/// Fans published events out to bound handlers and sagas.
///
/// Handlers bound to the same event run one after another in binding order.
/// A failing or panicking handler is reported on the unhandled channel with
/// the event as cause; delivery to other handlers continues.
///
/// Cloning yields another handle to the same dispatcher. Dropping the last
/// handle releases every subscription, as [`EventDispatcher::on_teardown`]
/// does.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    /// Creates a dispatcher and starts its delivery task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(
        commands: Arc<CommandDispatcher>,
        unhandled: UnhandledExceptionChannel,
        resolver: Arc<dyn HandlerResolver>,
        metadata: Arc<dyn MessageMetadata>,
        config: BusConfig,
    ) -> Self {
        Self::with_stream(
            EventChannel::new(),
            commands,
            unhandled,
            resolver,
            metadata,
            config,
        )
    }

    /// Creates a dispatcher over an existing stream.
    ///
    /// Command handlers that record events can be given the stream before the
    /// dispatcher exists.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn with_stream(
        stream: EventChannel,
        commands: Arc<CommandDispatcher>,
        unhandled: UnhandledExceptionChannel,
        resolver: Arc<dyn HandlerResolver>,
        metadata: Arc<dyn MessageMetadata>,
        config: BusConfig,
    ) -> Self {
        let (queue, deliveries) = mpsc::unbounded_channel();
        tokio::spawn(run_deliveries(deliveries, unhandled.clone()));

        let publisher: Arc<dyn EventPublisher> = Arc::new(stream.clone());
        Self {
            inner: Arc::new(Inner {
                stream,
                publisher: RwLock::new(publisher),
                commands,
                unhandled,
                resolver,
                metadata,
                config,
                queue,
                pending: Pending::new(),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the dispatcher's own stream.
    ///
    /// Aggregates and custom publishers push events here to reach the bound
    /// handlers and sagas.
    pub fn stream(&self) -> EventChannel {
        self.inner.stream.clone()
    }

    /// Replaces the publisher used by `publish` and `publish_all`.
    pub fn set_publisher(&self, publisher: Arc<dyn EventPublisher>) {
        *self.inner.publisher.write() = publisher;
    }

    fn publisher(&self) -> Arc<dyn EventPublisher> {
        Arc::clone(&*self.inner.publisher.read())
    }

    /// Hands `event` to the current publisher and returns immediately.
    pub fn publish(&self, event: EventRef) {
        self.publisher().publish(event);
    }

    /// Hands `events` to the current publisher's batch hook.
    ///
    /// Delivery is per event; a partial delivery is not reported.
    pub fn publish_all(&self, events: Vec<EventRef>) {
        self.publisher().publish_all(events);
    }

    /// Resolves and binds every declared event handler.
    ///
    /// A handler declared without associated events receives every event.
    /// Unresolved handlers are skipped. Returns the number of subscriptions
    /// created.
    pub fn register(&self, handler_types: &[HandlerType]) -> usize {
        let mut bound = 0;
        for handler_type in handler_types {
            let Some(handler) = self.inner.resolver.resolve_event_handler(handler_type) else {
                tracing::debug!(
                    handler = handler_type.name(),
                    "event handler not resolved, skipping"
                );
                continue;
            };
            let events = self.inner.metadata.declared_events(handler_type);
            if events.is_empty() {
                self.bind(handler, None);
                bound += 1;
                continue;
            }
            for event in events {
                let event_id = self.inner.metadata.identifier_for(&event);
                self.bind(Arc::clone(&handler), Some(event_id));
                bound += 1;
            }
        }
        bound
    }

    /// Subscribes `handler` to events whose identifier is `event_id`, or to
    /// every event when `event_id` is `None`.
    pub fn bind(&self, handler: Arc<dyn EventHandler>, event_id: Option<MessageId>) {
        let queue = self.inner.queue.clone();
        let pending = Arc::clone(&self.inner.pending);
        let name = handler.name();
        let deliver = move |envelope: &EventEnvelope| {
            let delivery = Delivery {
                handler: Arc::clone(&handler),
                envelope: envelope.clone(),
                _in_flight: pending.track(),
            };
            if queue.send(delivery).is_err() {
                tracing::debug!("event delivery queue closed, dropping delivery");
            }
        };

        let subscription = match event_id {
            Some(event_id) => {
                tracing::debug!(handler = name, %event_id, "event handler bound");
                let metadata = Arc::clone(&self.inner.metadata);
                self.inner.stream.channel.subscribe_filtered(
                    move |envelope: &EventEnvelope| {
                        metadata.identifier_for(&envelope.event.message_type()) == event_id
                    },
                    deliver,
                )
            }
            None => {
                tracing::debug!(handler = name, "broadcast event handler bound");
                self.inner.stream.channel.subscribe(deliver)
            }
        };
        self.inner.subscriptions.lock().push(subscription);
    }

    /// Resolves every declared saga owner and binds each of its sagas.
    ///
    /// Unresolved owners are skipped. A declared saga the owner does not
    /// provide is a [`BusError::MalformedSaga`]. Returns the number of sagas
    /// bound.
    pub fn register_sagas(&self, owner_types: &[HandlerType]) -> Result<usize, BusError> {
        let mut bound = 0;
        for owner_type in owner_types {
            let Some(owner) = self.inner.resolver.resolve_saga_owner(owner_type) else {
                tracing::debug!(owner = owner_type.name(), "saga owner not resolved, skipping");
                continue;
            };
            for name in self.inner.metadata.declared_saga_methods(owner_type) {
                let saga = owner.saga(&name).ok_or_else(|| BusError::MalformedSaga {
                    saga: name.clone(),
                    reason: format!("{} does not provide it", owner_type.name()),
                })?;
                self.bind_saga(&name, saga)?;
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// Applies `saga` to the unfiltered event stream and executes each command
    /// it emits through the command dispatcher.
    ///
    /// Commands from one saga run sequentially. Failures are reported on the
    /// unhandled channel with the command as cause.
    pub fn bind_saga(&self, name: &str, saga: Saga) -> Result<(), BusError> {
        let (input, queue) = mpsc::unbounded_channel();
        let cursor: Cursor = Arc::new(Mutex::new(None));
        let events = saga::input_stream(queue, Arc::clone(&cursor));
        let emitted = catch_unwind(AssertUnwindSafe(|| saga.apply(events))).map_err(|payload| {
            BusError::MalformedSaga {
                saga: name.to_string(),
                reason: HandlerPanic::new(name, payload).message,
            }
        })?;

        let pending = Arc::clone(&self.inner.pending);
        let subscription = self.inner.stream.channel.subscribe(move |envelope| {
            if input.send((envelope.clone(), pending.track())).is_err() {
                tracing::debug!("saga input closed, dropping event");
            }
        });
        self.inner.subscriptions.lock().push(subscription);

        let driver = SagaDriver {
            name: name.to_string(),
            cursor,
            commands: Arc::clone(&self.inner.commands),
            unhandled: self.inner.unhandled.clone(),
            hop_limit: self.inner.config.saga_hop_limit,
        };
        tokio::spawn(driver.run(emitted));
        tracing::debug!(saga = name, "saga bound");
        Ok(())
    }

    /// Waits until every queued delivery and every saga reaction has run,
    /// including work caused by them.
    ///
    /// Awaiting this from inside a handler never completes.
    pub async fn flush(&self) {
        self.inner.pending.wait_idle().await;
    }

    /// Releases every subscription this dispatcher created.
    ///
    /// In-flight deliveries still run. Returns the number released; a second
    /// call releases nothing.
    pub fn on_teardown(&self) -> usize {
        let subscriptions: Vec<Subscription> = self.inner.subscriptions.lock().drain(..).collect();
        let released = subscriptions
            .into_iter()
            .map(Subscription::unsubscribe)
            .filter(|released| *released)
            .count();
        tracing::info!(released, "event dispatcher torn down");
        released
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    pub fn unhandled(&self) -> &UnhandledExceptionChannel {
        &self.inner.unhandled
    }
}

impl EventPublisher for EventDispatcher {
    fn publish(&self, event: EventRef) {
        EventDispatcher::publish(self, event);
    }

    fn publish_all(&self, events: Vec<EventRef>) {
        EventDispatcher::publish_all(self, events);
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriptions", &self.subscription_count())
            .field("pending", &self.inner.pending.count())
            .finish()
    }
}
