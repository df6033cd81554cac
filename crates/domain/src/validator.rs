//! Pluggable validators and the manager that runs them.

use crate::broken_rule::BrokenRuleCollection;

/// A reusable set of rules for one kind of subject.
///
/// `add_rules` runs once per validation pass and must be deterministic:
/// the same subject state always yields the same rules, with no side
/// effects outside `rules`.
pub trait Validator<T: ?Sized>: Send + Sync {
    /// Inspects `subject` and records every rule it breaks.
    fn add_rules(&self, subject: &T, rules: &mut BrokenRuleCollection);

    /// Returns the validator name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Adapts a closure into a [`Validator`].
pub struct FnValidator<F> {
    name: &'static str,
    rules: F,
}

impl<F> FnValidator<F> {
    pub fn new(name: &'static str, rules: F) -> Self {
        Self { name, rules }
    }
}

impl<T, F> Validator<T> for FnValidator<F>
where
    T: ?Sized,
    F: Fn(&T, &mut BrokenRuleCollection) + Send + Sync,
{
    fn add_rules(&self, subject: &T, rules: &mut BrokenRuleCollection) {
        (self.rules)(subject, rules)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Holds the validators registered for one subject type.
pub struct ValidatorRuleManager<T: ?Sized> {
    validators: Vec<Box<dyn Validator<T>>>,
}

impl<T: ?Sized> ValidatorRuleManager<T> {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Registers a validator. Validators run in registration order.
    pub fn add_validator(&mut self, validator: impl Validator<T> + 'static) -> &mut Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Registers a closure as a named validator.
    pub fn add_fn<F>(&mut self, name: &'static str, rules: F) -> &mut Self
    where
        F: Fn(&T, &mut BrokenRuleCollection) + Send + Sync + 'static,
        T: 'static,
    {
        self.add_validator(FnValidator::new(name, rules))
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Runs every validator against `subject` and returns the merged,
    /// deduplicated rules.
    pub fn get_broken_rules(&self, subject: &T) -> BrokenRuleCollection {
        let mut merged = BrokenRuleCollection::new();
        for validator in &self.validators {
            let mut rules = BrokenRuleCollection::new();
            validator.add_rules(subject, &mut rules);
            if !rules.is_empty() {
                tracing::trace!(
                    validator = validator.name(),
                    broken = rules.len(),
                    "validator reported broken rules"
                );
            }
            merged.merge(&rules);
        }
        merged
    }
}

impl<T: ?Sized> Default for ValidatorRuleManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for ValidatorRuleManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}
