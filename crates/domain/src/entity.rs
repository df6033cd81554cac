//! Entities: props with a stable identity.

use common::EntityId;

use crate::broken_rule::BrokenRuleCollection;
use crate::error::DomainError;
use crate::tracking::{TrackingState, TrackingStatus};
use crate::value_object::{Component, Core, Props};

/// A domain object identified by an [`EntityId`] rather than its props.
///
/// Two entities are equal when their ids are equal, whatever their props.
#[derive(Debug, Clone)]
pub struct Entity<P> {
    id: EntityId,
    core: Core<P>,
}

impl<P: Props> Entity<P> {
    /// Builds a new entity with a fresh id, tracked as New.
    pub fn create(props: P) -> Result<Self, DomainError> {
        Self::create_with_id(EntityId::new(), props)
    }

    /// Builds a new entity with a caller-chosen id, tracked as New.
    pub fn create_with_id(id: EntityId, props: P) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            core: Core::new(props, Some(TrackingStatus::New))?,
        })
    }

    /// Rehydrates a persisted entity, tracked as Clean.
    pub fn load(id: EntityId, props: P) -> Result<Self, DomainError> {
        Ok(Self {
            id,
            core: Core::new(props, None)?,
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn props(&self) -> &P {
        self.core.props()
    }

    pub fn into_props(self) -> P {
        self.core.into_props()
    }

    /// Applies `mutate` to a copy of the props, re-validates and marks Dirty.
    pub fn update<F>(&mut self, mutate: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut P),
    {
        self.core.update(mutate)
    }

    pub fn validate(&mut self) -> bool {
        self.core.validate()
    }

    pub fn is_valid(&self) -> bool {
        self.core.broken_rules().is_empty()
    }

    pub fn broken_rules(&self) -> &BrokenRuleCollection {
        self.core.broken_rules()
    }

    pub fn tracking_state(&self) -> &TrackingState {
        self.core.tracking()
    }

    pub fn delete(&mut self) {
        self.core.tracking_mut().mark_deleted();
    }

    pub fn delete_self(&mut self) {
        self.core.tracking_mut().mark_self_deleted();
    }

    pub fn mark_clean(&mut self) {
        self.core.tracking_mut().mark_clean();
    }

    pub fn detect_changes(&mut self) {
        self.core.detect_changes();
    }
}

impl<P: Props> Component for Entity<P> {
    fn tracking_state(&self) -> &TrackingState {
        self.core.tracking()
    }

    fn broken_rules(&self) -> &BrokenRuleCollection {
        self.core.broken_rules()
    }
}

impl<P> PartialEq for Entity<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<P> Eq for Entity<P> {}

impl<P> std::hash::Hash for Entity<P> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Performer {
        stage_name: String,
    }

    impl Props for Performer {
        fn business_rules(&self, rules: &mut BrokenRuleCollection) {
            rules.add_if(
                self.stage_name.trim().is_empty(),
                "stage_name",
                "Stage name is required",
            );
        }
    }

    fn performer(name: &str) -> Entity<Performer> {
        Entity::create(Performer {
            stage_name: name.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_equality_is_by_id() {
        let a = performer("Nina");
        let b = performer("Nina");
        assert_ne!(a, b);

        let mut renamed = a.clone();
        renamed.update(|p| p.stage_name = "Simone".to_string()).unwrap();
        assert_eq!(a, renamed);
    }

    #[test]
    fn test_load_keeps_id_and_is_clean() {
        let id = EntityId::new();
        let entity = Entity::load(
            id,
            Performer {
                stage_name: "Nina".to_string(),
            },
        )
        .unwrap();
        assert_eq!(entity.id(), id);
        assert!(entity.tracking_state().is_clean());
    }

    #[test]
    fn test_invalid_props_are_reported_not_rejected() {
        let entity = performer("  ");
        assert!(!entity.is_valid());
        assert!(entity.broken_rules().contains("stage_name", "Stage name is required"));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut entity = performer("Nina");
        assert!(entity.tracking_state().is_new());
        entity.mark_clean();
        assert!(entity.tracking_state().is_clean());
        entity.update(|p| p.stage_name.push('!')).unwrap();
        assert!(entity.tracking_state().is_dirty());
        entity.delete_self();
        assert!(entity.tracking_state().is_self_deleted());
        entity.delete();
        assert!(entity.tracking_state().is_deleted());
    }
}
