//! Value objects and the props contract shared by every domain type.

use std::fmt;

use crate::broken_rule::BrokenRuleCollection;
use crate::error::DomainError;
use crate::tracking::{TrackingState, TrackingStatus};
use crate::validator::ValidatorRuleManager;

/// Anything nested inside props that carries its own lifecycle and rules.
///
/// Parents walk their declared children through this trait to merge broken
/// rules and detect changes.
pub trait Component {
    fn tracking_state(&self) -> &TrackingState;

    fn broken_rules(&self) -> &BrokenRuleCollection;
}

/// The payload of a value object, entity or aggregate root.
///
/// Construction runs `guard` first (structural sanity, fatal), then
/// `business_rules`, then the registered validators, then merges the rules of
/// every declared child. Only a guard failure is an error; everything else is
/// collected as broken rules.
pub trait Props: Clone + fmt::Debug + Send + Sync + 'static {
    /// Rejects structurally impossible props.
    fn guard(&self) -> Result<(), DomainError> {
        Ok(())
    }

    /// Records the rules this payload breaks.
    fn business_rules(&self, _rules: &mut BrokenRuleCollection) {}

    /// Registers reusable validators for this payload.
    fn register_validators(_validators: &mut ValidatorRuleManager<Self>) {}

    /// Returns the nested components whose rules and state roll up here.
    fn children(&self) -> Vec<&dyn Component> {
        Vec::new()
    }
}

/// Props together with their tracking state and current broken rules.
#[derive(Debug, Clone)]
pub(crate) struct Core<P> {
    props: P,
    tracking: TrackingState,
    broken_rules: BrokenRuleCollection,
}

impl<P: Props> Core<P> {
    pub(crate) fn new(props: P, status: Option<TrackingStatus>) -> Result<Self, DomainError> {
        props.guard()?;
        let mut core = Self {
            props,
            tracking: TrackingState::new(),
            broken_rules: BrokenRuleCollection::new(),
        };
        core.validate();
        if let Some(status) = status {
            core.tracking.transition_to(status);
        }
        Ok(core)
    }

    pub(crate) fn props(&self) -> &P {
        &self.props
    }

    pub(crate) fn into_props(self) -> P {
        self.props
    }

    pub(crate) fn tracking(&self) -> &TrackingState {
        &self.tracking
    }

    pub(crate) fn tracking_mut(&mut self) -> &mut TrackingState {
        &mut self.tracking
    }

    pub(crate) fn broken_rules(&self) -> &BrokenRuleCollection {
        &self.broken_rules
    }

    pub(crate) fn validate(&mut self) -> bool {
        let mut rules = BrokenRuleCollection::new();
        self.props.business_rules(&mut rules);

        let mut validators = ValidatorRuleManager::new();
        P::register_validators(&mut validators);
        rules.merge(&validators.get_broken_rules(&self.props));

        for child in self.props.children() {
            rules.merge(child.broken_rules());
        }

        self.broken_rules = rules;
        self.broken_rules.is_empty()
    }

    pub(crate) fn update<F>(&mut self, mutate: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut P),
    {
        let mut next = self.props.clone();
        mutate(&mut next);
        next.guard()?;
        self.props = next;
        self.validate();
        self.tracking.mark_dirty();
        Ok(())
    }

    pub(crate) fn detect_changes(&mut self) {
        let states: Vec<TrackingState> = self
            .props
            .children()
            .into_iter()
            .map(|child| *child.tracking_state())
            .collect();
        self.tracking.detect_changes(&states);
    }
}

/// An immutable-by-identity domain value, equal to any other with the same props.
///
/// ```
/// use domain::{BrokenRuleCollection, Props, ValueObject};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Price { cents: i64 }
///
/// impl Props for Price {
///     fn business_rules(&self, rules: &mut BrokenRuleCollection) {
///         rules.add_if(self.cents <= 0, "cents", "Price must be positive");
///     }
/// }
///
/// let price = ValueObject::create(Price { cents: -5 }).unwrap();
/// assert!(!price.is_valid());
/// assert_eq!(price, ValueObject::create(Price { cents: -5 }).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct ValueObject<P> {
    core: Core<P>,
}

impl<P: Props> ValueObject<P> {
    /// Builds a new value object, tracked as New.
    pub fn create(props: P) -> Result<Self, DomainError> {
        Ok(Self {
            core: Core::new(props, Some(TrackingStatus::New))?,
        })
    }

    /// Rehydrates a persisted value object, tracked as Clean.
    pub fn load(props: P) -> Result<Self, DomainError> {
        Ok(Self {
            core: Core::new(props, None)?,
        })
    }

    pub fn props(&self) -> &P {
        self.core.props()
    }

    pub fn into_props(self) -> P {
        self.core.into_props()
    }

    /// Applies `mutate` to a copy of the props, re-validates and marks Dirty.
    ///
    /// A guard failure leaves the value object unchanged.
    pub fn update<F>(&mut self, mutate: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut P),
    {
        self.core.update(mutate)
    }

    /// Re-runs every rule and returns whether none are broken.
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

    /// Marks this value for deletion by its owner.
    pub fn delete(&mut self) {
        self.core.tracking_mut().mark_deleted();
    }

    /// Marks this value as removed on its own behalf.
    pub fn delete_self(&mut self) {
        self.core.tracking_mut().mark_self_deleted();
    }

    /// Marks this value as persisted and unchanged.
    pub fn mark_clean(&mut self) {
        self.core.tracking_mut().mark_clean();
    }

    /// Recomputes tracking state from the declared children.
    pub fn detect_changes(&mut self) {
        self.core.detect_changes();
    }
}

impl<P: Props> Component for ValueObject<P> {
    fn tracking_state(&self) -> &TrackingState {
        self.core.tracking()
    }

    fn broken_rules(&self) -> &BrokenRuleCollection {
        self.core.broken_rules()
    }
}

impl<P: PartialEq> PartialEq for ValueObject<P> {
    fn eq(&self, other: &Self) -> bool {
        self.core.props == other.core.props
    }
}

impl<P: Eq> Eq for ValueObject<P> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Email {
        address: String,
    }

    impl Props for Email {
        fn guard(&self) -> Result<(), DomainError> {
            if self.address.len() > 320 {
                return Err(DomainError::guard("address", "longer than 320 bytes"));
            }
            Ok(())
        }

        fn business_rules(&self, rules: &mut BrokenRuleCollection) {
            rules.add_if(self.address.is_empty(), "address", "Email is required");
        }

        fn register_validators(validators: &mut ValidatorRuleManager<Self>) {
            validators.add_fn("email-format", |email, rules| {
                rules.add_if(
                    !email.address.contains('@'),
                    "address",
                    "Email must contain @",
                );
            });
        }
    }

    #[derive(Debug, Clone)]
    struct Contact {
        primary: ValueObject<Email>,
        backup: Option<ValueObject<Email>>,
    }

    impl Props for Contact {
        fn children(&self) -> Vec<&dyn Component> {
            let mut children: Vec<&dyn Component> = Vec::new();
            children.push(&self.primary);
            if let Some(backup) = &self.backup {
                children.push(backup);
            }
            children
        }
    }

    fn email(address: &str) -> ValueObject<Email> {
        ValueObject::create(Email {
            address: address.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_create_is_new_and_valid() {
        let value = email("a@example.com");
        assert!(value.tracking_state().is_new());
        assert!(value.is_valid());
    }

    #[test]
    fn test_load_is_clean() {
        let value = ValueObject::load(Email {
            address: "a@example.com".to_string(),
        })
        .unwrap();
        assert!(value.tracking_state().is_clean());
    }

    #[test]
    fn test_business_rules_and_validators_are_combined() {
        let value = email("");
        assert!(!value.is_valid());
        assert_eq!(value.broken_rules().len(), 2);
    }

    #[test]
    fn test_guard_failure_is_an_error() {
        let result = ValueObject::create(Email {
            address: "x".repeat(400),
        });
        assert!(matches!(result, Err(DomainError::Guard { .. })));
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(email("a@example.com"), email("a@example.com"));
        assert_ne!(email("a@example.com"), email("b@example.com"));
    }

    #[test]
    fn test_update_revalidates_and_marks_dirty() {
        let mut value = email("a@example.com");
        value.update(|e| e.address = "broken".to_string()).unwrap();
        assert!(value.tracking_state().is_dirty());
        assert!(value.broken_rules().contains("address", "Email must contain @"));
    }

    #[test]
    fn test_rejected_update_leaves_value_unchanged() {
        let mut value = email("a@example.com");
        let result = value.update(|e| e.address = "y".repeat(400));
        assert!(result.is_err());
        assert_eq!(value.props().address, "a@example.com");
        assert!(value.tracking_state().is_new());
    }

    #[test]
    fn test_parent_inherits_child_broken_rules() {
        let contact = ValueObject::create(Contact {
            primary: email("a@example.com"),
            backup: Some(email("nope")),
        })
        .unwrap();
        assert!(!contact.is_valid());
        assert!(contact.broken_rules().contains("address", "Email must contain @"));
    }

    #[test]
    fn test_parent_detects_child_changes() {
        let mut primary = ValueObject::load(Email {
            address: "a@example.com".to_string(),
        })
        .unwrap();
        primary.delete();

        let mut contact = ValueObject::load(Contact {
            primary,
            backup: None,
        })
        .unwrap();
        assert!(contact.tracking_state().is_clean());

        contact.detect_changes();
        assert!(contact.tracking_state().is_deleted());
    }
}
