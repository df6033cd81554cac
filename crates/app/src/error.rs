//! Storefront error types.

use bus::BusError;
use common::EntityId;
use domain::{BrokenRuleCollection, DomainError};
use thiserror::Error;

use crate::catalog::ProductStatus;

/// Errors raised by storefront command handlers and the composition root.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Product {0} not found")]
    ProductNotFound(EntityId),

    #[error("Order {0} not found")]
    OrderNotFound(EntityId),

    #[error("Product {product_id} is {status}, not Active")]
    ProductUnavailable {
        product_id: EntityId,
        status: ProductStatus,
    },

    #[error("Insufficient stock for {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: u32,
        available: u32,
    },

    #[error("Validation failed: {}", messages.join("; "))]
    Validation { messages: Vec<String> },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl AppError {
    /// Builds a validation error from the rules an aggregate breaks.
    pub fn validation(rules: &BrokenRuleCollection) -> Self {
        AppError::Validation {
            messages: rules.messages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_rules() {
        let mut rules = BrokenRuleCollection::new();
        rules.add("name", "Name is required");
        rules.add("sku", "SKU is required");

        let error = AppError::validation(&rules);
        assert_eq!(
            error.to_string(),
            "Validation failed: name: Name is required; sku: SKU is required"
        );
    }
}
