//! In-memory aggregate storage.

use std::collections::HashMap;

use common::EntityId;
use domain::{AggregateRoot, Entity, Props};
use tokio::sync::RwLock;

/// Stores aggregates by id.
///
/// Only the entity is kept: recorded events and the merged publisher stay
/// with the caller's copy.
pub struct InMemoryRepository<P> {
    entities: RwLock<HashMap<EntityId, Entity<P>>>,
}

impl<P: Props> InMemoryRepository<P> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the stored aggregate with `id`, tracked as Clean.
    pub async fn get(&self, id: EntityId) -> Option<AggregateRoot<P>> {
        let entities = self.entities.read().await;
        entities.get(&id).cloned().map(AggregateRoot::from_entity)
    }

    /// Persists `aggregate` and marks it Clean.
    pub async fn save(&self, aggregate: &mut AggregateRoot<P>) {
        aggregate.detect_changes();
        tracing::debug!(
            aggregate_id = %aggregate.id(),
            state = %aggregate.tracking_state(),
            "saving aggregate"
        );
        aggregate.mark_clean();
        self.entities
            .write()
            .await
            .insert(aggregate.id(), aggregate.entity().clone());
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Returns every stored id and props, in no particular order.
    pub async fn all(&self) -> Vec<(EntityId, P)> {
        self.entities
            .read()
            .await
            .iter()
            .map(|(id, entity)| (*id, entity.props().clone()))
            .collect()
    }
}

impl<P: Props> Default for InMemoryRepository<P> {
    fn default() -> Self {
        Self::new()
    }
}
