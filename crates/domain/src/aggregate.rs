//! Aggregate roots: entities that record domain events.

use std::fmt;
use std::sync::Arc;

use common::{DomainEvent, EntityId, EventPublisher, EventRef};

use crate::broken_rule::BrokenRuleCollection;
use crate::entity::Entity;
use crate::error::DomainError;
use crate::tracking::TrackingState;
use crate::value_object::{Component, Props};

/// An entity that owns identity, validation and recorded-but-unpublished
/// domain events.
///
/// Events accumulate through [`add_domain_event`](Self::add_domain_event) and
/// leave through [`commit`](Self::commit), which hands them to the merged
/// publisher and clears the list synchronously. Each recorded event is handed
/// off at most once.
pub struct AggregateRoot<P> {
    entity: Entity<P>,
    events: Vec<EventRef>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl<P: Props> AggregateRoot<P> {
    /// Builds a new aggregate with a fresh id, tracked as New.
    pub fn create(props: P) -> Result<Self, DomainError> {
        Ok(Self::from_entity(Entity::create(props)?))
    }

    /// Builds a new aggregate with a caller-chosen id, tracked as New.
    pub fn create_with_id(id: EntityId, props: P) -> Result<Self, DomainError> {
        Ok(Self::from_entity(Entity::create_with_id(id, props)?))
    }

    /// Rehydrates a persisted aggregate, tracked as Clean.
    pub fn load(id: EntityId, props: P) -> Result<Self, DomainError> {
        Ok(Self::from_entity(Entity::load(id, props)?))
    }

    /// Wraps an existing entity with no recorded events and no publisher.
    pub fn from_entity(entity: Entity<P>) -> Self {
        Self {
            entity,
            events: Vec::new(),
            publisher: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id()
    }

    pub fn props(&self) -> &P {
        self.entity.props()
    }

    pub fn entity(&self) -> &Entity<P> {
        &self.entity
    }

    /// Applies `mutate` to a copy of the props, re-validates and marks Dirty.
    pub fn update<F>(&mut self, mutate: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut P),
    {
        self.entity.update(mutate)
    }

    pub fn validate(&mut self) -> bool {
        self.entity.validate()
    }

    pub fn is_valid(&self) -> bool {
        self.entity.is_valid()
    }

    pub fn broken_rules(&self) -> &BrokenRuleCollection {
        self.entity.broken_rules()
    }

    pub fn tracking_state(&self) -> &TrackingState {
        self.entity.tracking_state()
    }

    pub fn delete(&mut self) {
        self.entity.delete();
    }

    pub fn delete_self(&mut self) {
        self.entity.delete_self();
    }

    pub fn mark_clean(&mut self) {
        self.entity.mark_clean();
    }

    pub fn detect_changes(&mut self) {
        self.entity.detect_changes();
    }

    /// Records an event to be published on the next commit.
    pub fn add_domain_event(&mut self, event: impl DomainEvent) {
        self.events.push(Arc::new(event));
    }

    /// Records an already shared event.
    pub fn add_domain_event_ref(&mut self, event: EventRef) {
        self.events.push(event);
    }

    /// Returns the events recorded since the last commit.
    pub fn uncommitted_events(&self) -> &[EventRef] {
        &self.events
    }

    /// Drains the recorded events without publishing them.
    pub fn take_events(&mut self) -> Vec<EventRef> {
        std::mem::take(&mut self.events)
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Attaches the publisher that `commit` and `publish` hand events to.
    pub fn merge_publisher(&mut self, publisher: Arc<dyn EventPublisher>) {
        self.publisher = Some(publisher);
    }

    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }

    /// Hands every recorded event to the merged publisher and clears the list.
    ///
    /// Returns the number of events handed off. Without a merged publisher
    /// nothing is handed off and the events stay recorded.
    pub fn commit(&mut self) -> Result<usize, DomainError> {
        let publisher = self.publisher.clone().ok_or(DomainError::NoPublisher {
            aggregate_id: self.id(),
        })?;

        let events = self.take_events();
        let count = events.len();
        if count > 0 {
            publisher.publish_all(events);
            metrics::counter!("domain_events_committed_total").increment(count as u64);
            tracing::debug!(aggregate_id = %self.id(), count, "committed domain events");
        }
        Ok(count)
    }

    /// Hands one event straight to the merged publisher, bypassing the
    /// recorded list.
    pub fn publish(&self, event: impl DomainEvent) -> Result<(), DomainError> {
        let publisher = self.publisher.as_ref().ok_or(DomainError::NoPublisher {
            aggregate_id: self.id(),
        })?;
        publisher.publish(Arc::new(event));
        Ok(())
    }
}

impl<P: Props> Component for AggregateRoot<P> {
    fn tracking_state(&self) -> &TrackingState {
        self.entity.tracking_state()
    }

    fn broken_rules(&self) -> &BrokenRuleCollection {
        self.entity.broken_rules()
    }
}

impl<P: Clone> Clone for AggregateRoot<P> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            events: self.events.clone(),
            publisher: self.publisher.clone(),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for AggregateRoot<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("entity", &self.entity)
            .field("events", &self.events)
            .field("has_publisher", &self.publisher.is_some())
            .finish()
    }
}

impl<P> PartialEq for AggregateRoot<P> {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
    }
}

impl<P> Eq for AggregateRoot<P> {}
