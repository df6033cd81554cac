//! Message marker traits and runtime type descriptors.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A request for exactly one mutation, handled by exactly one handler.
///
/// Commands are plain structs; implementing the trait is a one-liner:
///
/// ```
/// use common::Command;
///
/// #[derive(Debug)]
/// struct CreateOrder {
///     customer: String,
/// }
///
/// impl Command for CreateOrder {}
/// ```
pub trait Command: Any + Send + Sync + fmt::Debug {
    /// Returns the command type name used in logs.
    fn command_name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// A fact that already happened, broadcast to zero or more handlers.
///
/// Events should be named in past tense.
pub trait DomainEvent: Any + Send + Sync + fmt::Debug {
    /// Returns the event type name used in logs.
    fn event_type(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Shared handle to a command in flight.
pub type CommandRef = Arc<dyn Command>;

/// Shared handle to a published event.
///
/// Every subscriber sees the same allocation, so identity can be checked
/// with [`Arc::ptr_eq`].
pub type EventRef = Arc<dyn DomainEvent>;

impl dyn Command {
    /// Returns the concrete command if it is of type `T`.
    pub fn downcast_ref<T: Command>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Returns true if the concrete command is of type `T`.
    pub fn is<T: Command>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }

    /// Returns the runtime descriptor of the concrete command type.
    pub fn message_type(&self) -> MessageType {
        MessageType {
            type_id: (self as &dyn Any).type_id(),
            name: self.command_name(),
        }
    }
}

impl dyn DomainEvent {
    /// Returns the concrete event if it is of type `T`.
    pub fn downcast_ref<T: DomainEvent>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Returns true if the concrete event is of type `T`.
    pub fn is<T: DomainEvent>(&self) -> bool {
        (self as &dyn Any).is::<T>()
    }

    /// Returns the runtime descriptor of the concrete event type.
    pub fn message_type(&self) -> MessageType {
        MessageType {
            type_id: (self as &dyn Any).type_id(),
            name: self.event_type(),
        }
    }
}

/// Runtime descriptor of a command or event type.
///
/// Equality and hashing only consider the [`TypeId`]; the name is carried
/// for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct MessageType {
    type_id: TypeId,
    name: &'static str,
}

impl MessageType {
    /// Returns the descriptor for `T`.
    pub fn of<T: Any>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
        }
    }

    /// Returns the underlying type id.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the short type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for MessageType {}

impl std::hash::Hash for MessageType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Strips the module path from a type name, keeping generic arguments intact.
fn short_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
