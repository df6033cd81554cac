//! Explicit registration tables for handlers and message identifiers.
//!
//! The dispatchers only see two capabilities: resolving a declared handler
//! type to a live instance ([`HandlerResolver`]) and looking up message
//! identifiers and declarations ([`MessageMetadata`]). [`Registry`] is the
//! in-process implementation of both, built once at startup.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use common::{Command, DomainEvent, MessageId, MessageType};
use parking_lot::RwLock;

use crate::command::CommandHandler;
use crate::event::EventHandler;
use crate::saga::SagaOwner;

/// Runtime descriptor of a declared handler or saga-owner type.
#[derive(Clone, Copy)]
pub struct HandlerType {
    type_id: TypeId,
    name: &'static str,
}

impl HandlerType {
    pub fn of<H: Any>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            name: std::any::type_name::<H>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for HandlerType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HandlerType {}

impl std::hash::Hash for HandlerType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerType({})", self.name)
    }
}

/// Looks up live instances for declared handler types.
///
/// `None` means the handler is not part of the current composition root;
/// dispatchers skip it without error.
pub trait HandlerResolver: Send + Sync {
    fn resolve_command_handler(&self, handler_type: &HandlerType)
    -> Option<Arc<dyn CommandHandler>>;

    fn resolve_event_handler(&self, handler_type: &HandlerType) -> Option<Arc<dyn EventHandler>>;

    fn resolve_saga_owner(&self, owner_type: &HandlerType) -> Option<Arc<dyn SagaOwner>>;
}

/// Message identifiers and the associations declared with each handler.
pub trait MessageMetadata: Send + Sync {
    /// Returns the identifier of `message_type`, assigning one on first use.
    /// The same type always yields the same identifier for the life of the
    /// process.
    fn identifier_for(&self, message_type: &MessageType) -> MessageId;

    /// Returns the command types a command handler was declared for.
    fn declared_commands(&self, handler_type: &HandlerType) -> Vec<MessageType>;

    /// Returns the event types an event handler was declared for. Empty for
    /// a broadcast handler.
    fn declared_events(&self, handler_type: &HandlerType) -> Vec<MessageType>;

    /// Returns the saga names a saga owner was declared with.
    fn declared_saga_methods(&self, owner_type: &HandlerType) -> Vec<String>;
}

/// In-process handler registry.
///
/// ```
/// use bus::{MessageMetadata, Registry};
/// use common::{Command, MessageType};
///
/// #[derive(Debug)]
/// struct CreateOrder;
/// impl Command for CreateOrder {}
///
/// let registry = Registry::builder()
///     .identifier::<CreateOrder>("orders.create")
///     .build();
/// assert_eq!(
///     registry.identifier_for(&MessageType::of::<CreateOrder>()).as_str(),
///     "orders.create"
/// );
/// ```
#[derive(Default)]
pub struct Registry {
    identifiers: RwLock<HashMap<MessageType, MessageId>>,
    command_associations: HashMap<HandlerType, Vec<MessageType>>,
    event_associations: HashMap<HandlerType, Vec<MessageType>>,
    command_handlers: HashMap<HandlerType, Arc<dyn CommandHandler>>,
    event_handlers: HashMap<HandlerType, Arc<dyn EventHandler>>,
    saga_owners: HashMap<HandlerType, Arc<dyn SagaOwner>>,
    saga_methods: HashMap<HandlerType, Vec<String>>,
    command_handler_types: Vec<HandlerType>,
    event_handler_types: Vec<HandlerType>,
    saga_owner_types: Vec<HandlerType>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Returns every declared command handler type, in declaration order.
    pub fn command_handler_types(&self) -> &[HandlerType] {
        &self.command_handler_types
    }

    /// Returns every declared event handler type, in declaration order.
    pub fn event_handler_types(&self) -> &[HandlerType] {
        &self.event_handler_types
    }

    /// Returns every declared saga owner type, in declaration order.
    pub fn saga_owner_types(&self) -> &[HandlerType] {
        &self.saga_owner_types
    }
}

impl HandlerResolver for Registry {
    fn resolve_command_handler(
        &self,
        handler_type: &HandlerType,
    ) -> Option<Arc<dyn CommandHandler>> {
        self.command_handlers.get(handler_type).cloned()
    }

    fn resolve_event_handler(&self, handler_type: &HandlerType) -> Option<Arc<dyn EventHandler>> {
        self.event_handlers.get(handler_type).cloned()
    }

    fn resolve_saga_owner(&self, owner_type: &HandlerType) -> Option<Arc<dyn SagaOwner>> {
        self.saga_owners.get(owner_type).cloned()
    }
}

impl MessageMetadata for Registry {
    fn identifier_for(&self, message_type: &MessageType) -> MessageId {
        if let Some(id) = self.identifiers.read().get(message_type) {
            return id.clone();
        }
        let mut identifiers = self.identifiers.write();
        match identifiers.entry(*message_type) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let id = MessageId::generate();
                tracing::trace!(message = message_type.name(), %id, "assigned message identifier");
                entry.insert(id).clone()
            }
        }
    }

    fn declared_commands(&self, handler_type: &HandlerType) -> Vec<MessageType> {
        self.command_associations
            .get(handler_type)
            .cloned()
            .unwrap_or_default()
    }

    fn declared_events(&self, handler_type: &HandlerType) -> Vec<MessageType> {
        self.event_associations
            .get(handler_type)
            .cloned()
            .unwrap_or_default()
    }

    fn declared_saga_methods(&self, owner_type: &HandlerType) -> Vec<String> {
        self.saga_methods
            .get(owner_type)
            .cloned()
            .unwrap_or_default()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("command_handlers", &self.command_handler_types)
            .field("event_handlers", &self.event_handler_types)
            .field("saga_owners", &self.saga_owner_types)
            .field("identifiers", &self.identifiers.read().len())
            .finish()
    }
}

/// Builds a [`Registry`] at process start.
///
/// The `declare_*` methods record a handler's association without a live
/// instance, which models a handler excluded from this composition root.
#[derive(Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    /// Declares `handler` as the handler for command `C`.
    pub fn command_handler<C, H>(mut self, handler: H) -> Self
    where
        C: Command,
        H: CommandHandler + 'static,
    {
        let handler_type = HandlerType::of::<H>();
        self.registry
            .command_handlers
            .insert(handler_type, Arc::new(handler));
        self.declare_command_handler::<C, H>()
    }

    /// Declares `H` as the handler for command `C` without an instance.
    pub fn declare_command_handler<C: Command, H: Any>(mut self) -> Self {
        let handler_type = HandlerType::of::<H>();
        associate(
            &mut self.registry.command_associations,
            handler_type,
            MessageType::of::<C>(),
        );
        push_unique(&mut self.registry.command_handler_types, handler_type);
        self
    }

    /// Declares `handler` for event `E`.
    pub fn event_handler<E, H>(self, handler: H) -> Self
    where
        E: DomainEvent,
        H: EventHandler + 'static,
    {
        self.event_handler_for(handler, [MessageType::of::<E>()])
    }

    /// Declares `handler` for several event types.
    pub fn event_handler_for<H, I>(mut self, handler: H, events: I) -> Self
    where
        H: EventHandler + 'static,
        I: IntoIterator<Item = MessageType>,
    {
        let handler_type = HandlerType::of::<H>();
        self.registry
            .event_handlers
            .insert(handler_type, Arc::new(handler));
        for event in events {
            associate(&mut self.registry.event_associations, handler_type, event);
        }
        push_unique(&mut self.registry.event_handler_types, handler_type);
        self
    }

    /// Declares `handler` for every event (no association).
    pub fn broadcast_handler<H: EventHandler + 'static>(self, handler: H) -> Self {
        self.event_handler_for(handler, [])
    }

    /// Declares `H` as a handler for event `E` without an instance.
    pub fn declare_event_handler<E: DomainEvent, H: Any>(mut self) -> Self {
        let handler_type = HandlerType::of::<H>();
        associate(
            &mut self.registry.event_associations,
            handler_type,
            MessageType::of::<E>(),
        );
        push_unique(&mut self.registry.event_handler_types, handler_type);
        self
    }

    /// Declares a saga owner together with the names of its sagas.
    pub fn saga_owner<O, I, S>(mut self, owner: O, sagas: I) -> Self
    where
        O: SagaOwner + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let owner_type = HandlerType::of::<O>();
        self.registry.saga_owners.insert(owner_type, Arc::new(owner));
        self.registry
            .saga_methods
            .insert(owner_type, sagas.into_iter().map(Into::into).collect());
        push_unique(&mut self.registry.saga_owner_types, owner_type);
        self
    }

    /// Pins the identifier of message type `T` instead of generating one.
    pub fn identifier<T: Any>(self, id: impl Into<MessageId>) -> Self {
        self.registry
            .identifiers
            .write()
            .insert(MessageType::of::<T>(), id.into());
        self
    }

    pub fn build(self) -> Registry {
        self.registry
    }
}

fn associate(
    associations: &mut HashMap<HandlerType, Vec<MessageType>>,
    handler_type: HandlerType,
    message_type: MessageType,
) {
    let declared = associations.entry(handler_type).or_default();
    if !declared.contains(&message_type) {
        declared.push(message_type);
    }
}

fn push_unique(types: &mut Vec<HandlerType>, handler_type: HandlerType) {
    if !types.contains(&handler_type) {
        types.push(handler_type);
    }
}
