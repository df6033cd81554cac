//! Domain error types.

use common::EntityId;
use thiserror::Error;

use crate::transition::TransitionError;

/// Errors that can occur during domain operations.
///
/// Broken business rules are not errors: they are collected on the subject
/// and inspected through `is_valid()` / `broken_rules()`.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The props failed their structural sanity check.
    #[error("Guard failed on '{property}': {reason}")]
    Guard { property: String, reason: String },

    /// A guarded status transition was rejected or undefined.
    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    /// The aggregate has no publisher to hand its events to.
    #[error("No publisher merged into aggregate {aggregate_id}")]
    NoPublisher { aggregate_id: EntityId },
}

impl DomainError {
    /// Builds a guard failure for the given property.
    pub fn guard(property: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::Guard {
            property: property.into(),
            reason: reason.into(),
        }
    }
}
