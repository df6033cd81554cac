//! Sagas: reactive processes that map the event stream to follow-up commands.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use common::{Command, CommandRef, DomainEvent, EventRef};
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::command::CommandDispatcher;
use crate::error::{BusError, HandlerPanic};
use crate::event::{EventEnvelope, InFlight};
use crate::unhandled::{Cause, UnhandledExceptionChannel, UnhandledExceptionInfo};

/// Every event published on the dispatcher's stream.
pub type SagaEvents = BoxStream<'static, EventRef>;

/// Commands a saga wants executed. `None` items are dropped.
pub type SagaCommands = BoxStream<'static, Option<CommandRef>>;

type SagaFn = dyn Fn(SagaEvents) -> SagaCommands + Send + Sync;

/// A pure transformation from the event stream to a command stream.
///
/// The dispatcher applies the saga once when it is bound, then executes each
/// emitted command in order.
#[derive(Clone)]
pub struct Saga {
    apply: Arc<SagaFn>,
}

impl Saga {
    pub fn new<F>(apply: F) -> Self
    where
        F: Fn(SagaEvents) -> SagaCommands + Send + Sync + 'static,
    {
        Self {
            apply: Arc::new(apply),
        }
    }

    /// Builds a saga reacting to events of type `E` only.
    ///
    /// ```
    /// use bus::Saga;
    /// use common::{Command, DomainEvent};
    ///
    /// #[derive(Debug)]
    /// struct OrderPlaced { order: u32 }
    /// impl DomainEvent for OrderPlaced {}
    ///
    /// #[derive(Debug)]
    /// struct ShipOrder { order: u32 }
    /// impl Command for ShipOrder {}
    ///
    /// let saga = Saga::on(|placed: &OrderPlaced| Some(ShipOrder { order: placed.order }));
    /// # let _ = saga;
    /// ```
    pub fn on<E, C, F>(map: F) -> Self
    where
        E: DomainEvent,
        C: Command,
        F: Fn(&E) -> Option<C> + Send + Sync + 'static,
    {
        let map = Arc::new(map);
        Self::new(move |events: SagaEvents| {
            let map = Arc::clone(&map);
            events
                .filter_map(move |event| {
                    let emitted = event
                        .downcast_ref::<E>()
                        .map(|typed| (*map)(typed).map(|command| Arc::new(command) as CommandRef));
                    futures_util::future::ready(emitted)
                })
                .boxed()
        })
    }

    pub fn apply(&self, events: SagaEvents) -> SagaCommands {
        (self.apply)(events)
    }
}

impl fmt::Debug for Saga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Saga").finish_non_exhaustive()
    }
}

/// An object exposing named sagas.
pub trait SagaOwner: Send + Sync {
    /// Returns the saga registered under `name`.
    fn saga(&self, name: &str) -> Option<Saga>;
}

tokio::task_local! {
    static SAGA_HOPS: usize;
}

/// Number of saga hops behind the work running on this task.
pub(crate) fn current_hops() -> usize {
    SAGA_HOPS.try_with(|hops| *hops).unwrap_or(0)
}

/// Runs `future` with the saga hop count set to `hops`.
pub(crate) async fn with_hops<F: Future>(hops: usize, future: F) -> F::Output {
    SAGA_HOPS.scope(hops, future).await
}

/// The last event a saga pulled from its input.
pub(crate) type Cursor = Arc<Mutex<Option<EventEnvelope>>>;

/// Turns the saga's queue into its input stream.
///
/// An event stays in flight until the saga asks for the next one, so the
/// commands it produced have been executed by then.
pub(crate) fn input_stream(
    queue: mpsc::UnboundedReceiver<(EventEnvelope, InFlight)>,
    cursor: Cursor,
) -> SagaEvents {
    stream::unfold(
        (queue, None::<InFlight>),
        move |(mut queue, held)| {
            let cursor = Arc::clone(&cursor);
            async move {
                drop(held);
                let Some((envelope, in_flight)) = queue.recv().await else {
                    return None;
                };
                let event = Arc::clone(&envelope.event);
                *cursor.lock() = Some(envelope);
                Some((event, (queue, Some(in_flight))))
            }
        },
    )
    .boxed()
}

/// Executes a running saga's commands until its stream ends.
pub(crate) struct SagaDriver {
    pub(crate) name: String,
    pub(crate) cursor: Cursor,
    pub(crate) commands: Arc<CommandDispatcher>,
    pub(crate) unhandled: UnhandledExceptionChannel,
    pub(crate) hop_limit: usize,
}

impl SagaDriver {
    pub(crate) async fn run(self, mut emitted: SagaCommands) {
        loop {
            let next = AssertUnwindSafe(emitted.next()).catch_unwind().await;
            let command = match next {
                Ok(Some(Some(command))) => command,
                Ok(Some(None)) => continue,
                Ok(None) => break,
                Err(payload) => {
                    let panic = HandlerPanic::new(self.name.clone(), payload);
                    tracing::error!(saga = %self.name, error = %panic, "saga stream panicked");
                    let last = self.cursor.lock().clone();
                    if let Some(envelope) = last {
                        self.unhandled.publish(UnhandledExceptionInfo::new(
                            Cause::Event(envelope.event),
                            Arc::new(panic),
                        ));
                    }
                    break;
                }
            };
            self.dispatch(command).await;
        }
        tracing::debug!(saga = %self.name, "saga stream ended");
    }

    async fn dispatch(&self, command: CommandRef) {
        let hops = self
            .cursor
            .lock()
            .as_ref()
            .map_or(0, |envelope| envelope.hops)
            + 1;
        if hops > self.hop_limit {
            let error = BusError::SagaHopLimitExceeded {
                command_type: command.command_name(),
                hops,
                limit: self.hop_limit,
            };
            tracing::warn!(saga = %self.name, error = %error, "saga command dropped");
            self.report(command, error);
            return;
        }

        metrics::counter!("bus_saga_commands_total", "saga" => self.name.clone()).increment(1);
        tracing::debug!(saga = %self.name, command = command.command_name(), hops, "saga command");
        if let Err(error) = with_hops(hops, self.commands.execute(Arc::clone(&command))).await {
            self.report(command, error);
        }
    }

    fn report(&self, command: CommandRef, error: BusError) {
        self.unhandled.publish(UnhandledExceptionInfo::new(
            Cause::Command(command),
            error.into_exception(),
        ));
    }
}
