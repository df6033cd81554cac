//! Bus error types.

use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;

use common::MessageId;
use thiserror::Error;

/// Error returned by command and event handlers.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Errors raised by the dispatchers.
///
/// Everything except `Handler`, `HandlerPanicked` and `UnexpectedOutput` is a
/// programmer error surfaced while wiring the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No handler is bound to the command's identifier.
    #[error("No handler found for command {command_type} ({command_id})")]
    HandlerNotFound {
        command_id: MessageId,
        command_type: &'static str,
    },

    /// A handler is already bound to this command identifier.
    #[error("Invalid handler: command {command_id} already has a bound handler")]
    InvalidHandler { command_id: MessageId },

    /// A declared command handler has no associated command type.
    #[error("Handler {handler} declares no associated message type")]
    MissingAssociation { handler: &'static str },

    /// A declared saga could not be turned into a running stream.
    #[error("Malformed saga '{saga}': {reason}")]
    MalformedSaga { saga: String, reason: String },

    /// The command handler returned an error.
    #[error("Command handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// The command handler panicked.
    #[error(transparent)]
    HandlerPanicked(#[from] HandlerPanic),

    /// The command handler returned a value of a different type.
    #[error("Command output is not a {expected}")]
    UnexpectedOutput { expected: &'static str },

    /// A saga emitted a command past the configured hop limit.
    #[error("Saga hop limit exceeded: {command_type} would be hop {hops} (limit {limit})")]
    SagaHopLimitExceeded {
        command_type: &'static str,
        hops: usize,
        limit: usize,
    },
}

impl BusError {
    /// Converts this error into the payload reported on the unhandled channel.
    ///
    /// Handler errors are unwrapped so subscribers can filter on the
    /// handler's own error type.
    pub fn into_exception(self) -> Arc<dyn StdError + Send + Sync> {
        match self {
            BusError::Handler(source) => Arc::from(source),
            BusError::HandlerPanicked(panic) => Arc::new(panic),
            other => Arc::new(other),
        }
    }
}

/// A handler panicked while processing a message.
#[derive(Debug, Clone, Error)]
#[error("Handler {handler} panicked: {message}")]
pub struct HandlerPanic {
    pub handler: String,
    pub message: String,
}

impl HandlerPanic {
    /// Builds a panic report from a `catch_unwind` payload.
    pub fn new(handler: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            handler: handler.into(),
            message,
        }
    }
}

/// A handler received a message of a type it does not handle.
#[derive(Debug, Clone, Error)]
#[error("Expected message {expected}, received {actual}")]
pub struct MessageMismatch {
    pub expected: &'static str,
    pub actual: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("out of stock")]
    struct OutOfStock;

    #[test]
    fn test_handler_error_is_unwrapped_for_reporting() {
        let error = BusError::Handler(Box::new(OutOfStock));
        let exception = error.into_exception();
        assert!(exception.is::<OutOfStock>());
    }

    #[test]
    fn test_programmer_errors_are_reported_as_bus_errors() {
        let error = BusError::InvalidHandler {
            command_id: MessageId::new("create-order"),
        };
        let exception = error.into_exception();
        assert!(exception.is::<BusError>());
        assert_eq!(
            exception.to_string(),
            "Invalid handler: command create-order already has a bound handler"
        );
    }

    #[test]
    fn test_panic_payloads() {
        let from_str = HandlerPanic::new("h", Box::new("boom"));
        assert_eq!(from_str.message, "boom");

        let from_string = HandlerPanic::new("h", Box::new(String::from("bang")));
        assert_eq!(from_string.message, "bang");

        let opaque = HandlerPanic::new("h", Box::new(42_u8));
        assert_eq!(opaque.message, "non-string panic payload");
        assert_eq!(opaque.to_string(), "Handler h panicked: non-string panic payload");
    }
}
