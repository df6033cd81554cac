//! Shared types for the DDD runtime.
//!
//! This crate provides the vocabulary every other crate speaks:
//! - Identifiers for entities and message types
//! - Marker traits for commands and domain events
//! - The publisher seam aggregates hand their events to

pub mod message;
pub mod publisher;
pub mod types;

pub use message::{Command, CommandRef, DomainEvent, EventRef, MessageType};
pub use publisher::EventPublisher;
pub use types::{EntityId, MessageId};
