//! In-process dispatch runtime for the DDD core.
//!
//! This crate provides:
//! - `CommandDispatcher`: one handler per command identifier, request/response
//! - `EventDispatcher`: fan-out to event handlers and sagas, fire-and-forget
//! - `UnhandledExceptionChannel`: side channel for isolated handler failures
//! - `Registry`: explicit init-time tables standing in for handler discovery
//!
//! Data flows from a command, through a handler mutating an aggregate, to the
//! events it records, to event handlers and sagas, and back to new commands.
//! Handler failures on the event side never reach the publisher; they are
//! reported on the unhandled-exception channel instead.

pub mod channel;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod registry;
pub mod saga;
pub mod unhandled;

pub use channel::{Channel, Subscription};
pub use command::{
    CommandDispatcher, CommandHandler, CommandOutput, CommandPublisher, downcast_command,
};
pub use config::BusConfig;
pub use error::{BusError, HandlerError, HandlerPanic, MessageMismatch};
pub use event::{EventChannel, EventDispatcher, EventEnvelope, EventHandler, downcast_event};
pub use registry::{HandlerResolver, HandlerType, MessageMetadata, Registry, RegistryBuilder};
pub use saga::{Saga, SagaCommands, SagaEvents, SagaOwner};
pub use unhandled::{Cause, ExceptionFilter, UnhandledExceptionChannel, UnhandledExceptionInfo};
