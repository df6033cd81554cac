//! Product aggregate and its value objects.

use std::fmt;

use common::EntityId;
use domain::{
    BrokenRuleCollection, Component, DomainError, Props, TransitionError, TransitionGraph,
    ValidatorRuleManager, ValueObject,
};
use serde::Serialize;

/// Lifecycle of a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProductStatus {
    /// Created but not yet sellable.
    Draft,
    /// Available for ordering.
    Active,
    /// Temporarily withdrawn.
    Inactive,
    /// Permanently retired.
    Archived,
}

impl ProductStatus {
    /// Builds the graph of legal status changes.
    ///
    /// Archived is terminal and has no outgoing transitions.
    pub fn transitions() -> Result<TransitionGraph<ProductStatus>, TransitionError> {
        let mut graph = TransitionGraph::new();
        graph.define_transitions([
            (ProductStatus::Draft, vec![ProductStatus::Active]),
            (ProductStatus::Active, vec![ProductStatus::Inactive]),
            (
                ProductStatus::Inactive,
                vec![ProductStatus::Active, ProductStatus::Archived],
            ),
        ])?;
        Ok(graph)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "Draft",
            ProductStatus::Active => "Active",
            ProductStatus::Inactive => "Inactive",
            ProductStatus::Archived => "Archived",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monetary amount in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
    pub cents: i64,
    pub currency: String,
}

impl Props for Price {
    fn guard(&self) -> Result<(), DomainError> {
        let valid = self.currency.len() == 3
            && self.currency.chars().all(|c| c.is_ascii_uppercase());
        if !valid {
            return Err(DomainError::guard(
                "currency",
                format!("'{}' is not an ISO 4217 code", self.currency),
            ));
        }
        Ok(())
    }

    fn business_rules(&self, rules: &mut BrokenRuleCollection) {
        rules.add_if(self.cents <= 0, "price", "Price must be positive");
    }
}

/// Props of the product aggregate.
#[derive(Debug, Clone)]
pub struct Product {
    pub sku: String,
    pub name: String,
    pub price: ValueObject<Price>,
    pub stock: u32,
    pub status: ProductStatus,
}

impl Product {
    /// Returns true if orders may reference this product.
    pub fn is_sellable(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

impl Props for Product {
    fn business_rules(&self, rules: &mut BrokenRuleCollection) {
        rules.add_if(self.name.trim().is_empty(), "name", "Name is required");
    }

    fn register_validators(validators: &mut ValidatorRuleManager<Self>) {
        validators.add_fn("sku", |product: &Product, rules| {
            if product.sku.is_empty() {
                rules.add("sku", "SKU is required");
            } else if !product
                .sku
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
            {
                rules.add("sku", "SKU may only contain A-Z, 0-9 and '-'");
            }
        });
    }

    fn children(&self) -> Vec<&dyn Component> {
        vec![&self.price as &dyn Component]
    }
}

/// Serializable snapshot of a stored product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub id: EntityId,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub stock: u32,
    pub status: ProductStatus,
}

impl ProductView {
    pub fn new(id: EntityId, product: &Product) -> Self {
        let price = product.price.props();
        Self {
            id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            price_cents: price.cents,
            currency: price.currency.clone(),
            stock: product.stock,
            status: product.status,
        }
    }
}
