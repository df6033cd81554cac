//! Command dispatch: one handler per command identifier, request/response.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common::{Command, CommandRef, MessageId, MessageType};
use futures_util::FutureExt;
use parking_lot::RwLock;

use crate::channel::{Channel, Subscription};
use crate::error::{BusError, HandlerError, HandlerPanic, MessageMismatch};
use crate::registry::{HandlerResolver, HandlerType, MessageMetadata};

/// Value returned by a command handler.
///
/// Use [`CommandDispatcher::execute_as`] to recover the concrete type.
pub type CommandOutput = Box<dyn Any + Send>;

/// Handles exactly one command type.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, command: CommandRef) -> Result<CommandOutput, HandlerError>;

    /// Returns the handler name used in logs and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Observational broadcast of every command about to be executed.
pub trait CommandPublisher: Send + Sync {
    fn publish(&self, command: &CommandRef);
}

impl CommandPublisher for Channel<CommandRef> {
    fn publish(&self, command: &CommandRef) {
        Channel::publish(self, command);
    }
}

/// Recovers the concrete command inside a handler.
///
/// ```
/// use std::sync::Arc;
/// use bus::downcast_command;
/// use common::{Command, CommandRef};
///
/// #[derive(Debug)]
/// struct ShipOrder { tracking: String }
/// impl Command for ShipOrder {}
///
/// let command: CommandRef = Arc::new(ShipOrder { tracking: "TRK-1".into() });
/// let ship = downcast_command::<ShipOrder>(command.as_ref()).unwrap();
/// assert_eq!(ship.tracking, "TRK-1");
/// ```
pub fn downcast_command<C: Command>(command: &dyn Command) -> Result<&C, HandlerError> {
    command.downcast_ref::<C>().ok_or_else(|| {
        MessageMismatch {
            expected: MessageType::of::<C>().name(),
            actual: command.command_name(),
        }
        .into()
    })
}

/// Routes each command to its single bound handler.
///
/// Before the handler runs, the command is broadcast to the current
/// [`CommandPublisher`]. The broadcast is observational: execution does not
/// depend on anyone listening.
pub struct CommandDispatcher {
    handlers: RwLock<HashMap<MessageId, Arc<dyn CommandHandler>>>,
    publisher: RwLock<Arc<dyn CommandPublisher>>,
    channel: Channel<CommandRef>,
    resolver: Arc<dyn HandlerResolver>,
    metadata: Arc<dyn MessageMetadata>,
}

impl CommandDispatcher {
    pub fn new(resolver: Arc<dyn HandlerResolver>, metadata: Arc<dyn MessageMetadata>) -> Self {
        let channel = Channel::new();
        let publisher: Arc<dyn CommandPublisher> = Arc::new(channel.clone());
        Self {
            handlers: RwLock::new(HashMap::new()),
            publisher: RwLock::new(publisher),
            channel,
            resolver,
            metadata,
        }
    }

    /// Resolves and binds every declared command handler.
    ///
    /// Handlers the resolver does not know are skipped. Returns the number of
    /// bindings made.
    pub fn register(&self, handler_types: &[HandlerType]) -> Result<usize, BusError> {
        let mut bound = 0;
        for handler_type in handler_types {
            let Some(handler) = self.resolver.resolve_command_handler(handler_type) else {
                tracing::debug!(
                    handler = handler_type.name(),
                    "command handler not resolved, skipping"
                );
                continue;
            };
            let commands = self.metadata.declared_commands(handler_type);
            if commands.is_empty() {
                return Err(BusError::MissingAssociation {
                    handler: handler_type.name(),
                });
            }
            for command in commands {
                let command_id = self.metadata.identifier_for(&command);
                self.bind(Arc::clone(&handler), command_id)?;
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// Binds `handler` to `command_id`.
    ///
    /// Fails with [`BusError::InvalidHandler`] if the identifier already has
    /// a handler.
    pub fn bind(
        &self,
        handler: Arc<dyn CommandHandler>,
        command_id: MessageId,
    ) -> Result<(), BusError> {
        match self.handlers.write().entry(command_id) {
            Entry::Occupied(entry) => Err(BusError::InvalidHandler {
                command_id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                tracing::debug!(
                    handler = handler.name(),
                    command_id = %entry.key(),
                    "command handler bound"
                );
                entry.insert(handler);
                Ok(())
            }
        }
    }

    /// Executes `command` on its bound handler and returns the handler's output.
    ///
    /// Handler errors and panics are returned to the caller; nothing is
    /// reported on the unhandled channel from here.
    #[tracing::instrument(skip(self, command), fields(command = command.command_name()))]
    pub async fn execute(&self, command: CommandRef) -> Result<CommandOutput, BusError> {
        let command_type = command.message_type();
        let command_id = self.metadata.identifier_for(&command_type);
        let handler = self.handlers.read().get(&command_id).cloned();
        let Some(handler) = handler else {
            return Err(BusError::HandlerNotFound {
                command_id,
                command_type: command_type.name(),
            });
        };

        let publisher = Arc::clone(&*self.publisher.read());
        publisher.publish(&command);

        let started = Instant::now();
        let outcome = AssertUnwindSafe(handler.execute(command))
            .catch_unwind()
            .await;
        metrics::histogram!("bus_command_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("bus_commands_executed_total", "command" => command_type.name())
            .increment(1);

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => {
                metrics::counter!("bus_command_failures_total", "command" => command_type.name())
                    .increment(1);
                tracing::warn!(handler = handler.name(), error = %error, "command handler failed");
                Err(BusError::Handler(error))
            }
            Err(payload) => {
                metrics::counter!("bus_command_failures_total", "command" => command_type.name())
                    .increment(1);
                let panic = HandlerPanic::new(handler.name(), payload);
                tracing::error!(error = %panic, "command handler panicked");
                Err(panic.into())
            }
        }
    }

    /// Executes `command` and downcasts the output to `R`.
    pub async fn execute_as<R: Any>(&self, command: CommandRef) -> Result<R, BusError> {
        let output = self.execute(command).await?;
        output
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| BusError::UnexpectedOutput {
                expected: std::any::type_name::<R>(),
            })
    }

    /// Subscribes to the default command broadcast.
    ///
    /// Callbacks only see commands while the default publisher is in place.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&CommandRef) + Send + Sync + 'static,
    {
        self.channel.subscribe(callback)
    }

    /// Replaces the broadcast target used by `execute`.
    pub fn set_publisher(&self, publisher: Arc<dyn CommandPublisher>) {
        *self.publisher.write() = publisher;
    }

    pub fn is_bound(&self, command_id: &MessageId) -> bool {
        self.handlers.read().contains_key(command_id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("handlers", &self.handlers.read().len())
            .field("subscribers", &self.channel.subscriber_count())
            .finish()
    }
}
