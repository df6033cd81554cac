//! Aggregate integrity engine for the DDD runtime.
//!
//! This crate provides the building blocks feature modules compose into
//! their aggregates:
//! - Broken rule collection and pluggable validators
//! - Tracking state machine for entity lifecycle
//! - Transition graph for guarded domain status enums
//! - Value object, entity and aggregate root base types

pub mod aggregate;
pub mod broken_rule;
pub mod entity;
pub mod error;
pub mod tracking;
pub mod transition;
pub mod validator;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use broken_rule::{BrokenRule, BrokenRuleCollection, Severity};
pub use entity::Entity;
pub use error::DomainError;
pub use tracking::{TrackingState, TrackingStatus};
pub use transition::{TransitionError, TransitionGraph};
pub use validator::{FnValidator, Validator, ValidatorRuleManager};
pub use value_object::{Component, Props, ValueObject};
