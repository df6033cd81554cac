//! Side channel for failures isolated at subscription boundaries.

use std::error::Error as StdError;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CommandRef, EventRef};

use crate::channel::{Channel, Subscription};

/// The message whose processing failed.
#[derive(Debug, Clone)]
pub enum Cause {
    Command(CommandRef),
    Event(EventRef),
}

impl Cause {
    pub fn as_command(&self) -> Option<&CommandRef> {
        match self {
            Cause::Command(command) => Some(command),
            Cause::Event(_) => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventRef> {
        match self {
            Cause::Event(event) => Some(event),
            Cause::Command(_) => None,
        }
    }

    /// Returns the message type name.
    pub fn name(&self) -> &'static str {
        match self {
            Cause::Command(command) => command.command_name(),
            Cause::Event(event) => event.event_type(),
        }
    }
}

/// One failure reported by a dispatcher.
#[derive(Debug, Clone)]
pub struct UnhandledExceptionInfo {
    pub cause: Cause,
    pub exception: Arc<dyn StdError + Send + Sync>,
    pub occurred_at: DateTime<Utc>,
}

impl UnhandledExceptionInfo {
    pub fn new(cause: Cause, exception: Arc<dyn StdError + Send + Sync>) -> Self {
        Self {
            cause,
            exception,
            occurred_at: Utc::now(),
        }
    }

    /// Returns true if the exception is an `E`.
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.exception.is::<E>()
    }

    /// Returns the exception as an `E`, if it is one.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.exception.downcast_ref::<E>()
    }
}

/// Broadcast channel carrying [`UnhandledExceptionInfo`].
///
/// This is the only place handler failures on the event side become
/// observable. Dispatchers publish here instead of failing the stream that
/// carried the message.
#[derive(Debug, Clone, Default)]
pub struct UnhandledExceptionChannel {
    channel: Channel<UnhandledExceptionInfo>,
}

impl UnhandledExceptionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a failure to every subscriber.
    pub fn publish(&self, info: UnhandledExceptionInfo) {
        metrics::counter!("bus_unhandled_exceptions_total").increment(1);
        tracing::debug!(
            cause = info.cause.name(),
            error = %info.exception,
            "unhandled exception reported"
        );
        self.channel.publish(&info);
    }

    /// Subscribes to every reported failure.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UnhandledExceptionInfo) + Send + Sync + 'static,
    {
        self.channel.subscribe(callback)
    }

    /// Starts a filter for failures whose exception is an `E`.
    ///
    /// Widen it with [`ExceptionFilter::or`] before subscribing.
    pub fn of_type<E: StdError + 'static>(&self) -> ExceptionFilter {
        ExceptionFilter {
            channel: self.channel.clone(),
            matchers: vec![is_type::<E> as Matcher],
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }
}

type Matcher = fn(&(dyn StdError + Send + Sync + 'static)) -> bool;

fn is_type<E: StdError + 'static>(exception: &(dyn StdError + Send + Sync + 'static)) -> bool {
    exception.is::<E>()
}

/// A substream of the unhandled channel restricted to some exception types.
pub struct ExceptionFilter {
    channel: Channel<UnhandledExceptionInfo>,
    matchers: Vec<Matcher>,
}

impl ExceptionFilter {
    /// Also accepts exceptions of type `E`.
    pub fn or<E: StdError + 'static>(mut self) -> Self {
        self.matchers.push(is_type::<E>);
        self
    }

    /// Returns true if `info` passes this filter.
    pub fn matches(&self, info: &UnhandledExceptionInfo) -> bool {
        self.matchers
            .iter()
            .any(|matcher| matcher(info.exception.as_ref()))
    }

    /// Subscribes `callback` to the failures that pass this filter.
    pub fn subscribe<F>(self, callback: F) -> Subscription
    where
        F: Fn(&UnhandledExceptionInfo) + Send + Sync + 'static,
    {
        let matchers = self.matchers;
        self.channel.subscribe_filtered(
            move |info: &UnhandledExceptionInfo| {
                matchers
                    .iter()
                    .any(|matcher| matcher(info.exception.as_ref()))
            },
            callback,
        )
    }
}
