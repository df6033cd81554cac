//! Events recorded by the product aggregate.

use common::{DomainEvent, EntityId};

use super::ProductStatus;

#[derive(Debug, Clone)]
pub struct ProductCreated {
    pub product_id: EntityId,
    pub sku: String,
}

impl DomainEvent for ProductCreated {}

#[derive(Debug, Clone)]
pub struct ProductStatusChanged {
    pub product_id: EntityId,
    pub from: ProductStatus,
    pub to: ProductStatus,
}

impl DomainEvent for ProductStatusChanged {}

/// Stock was set aside for an order line.
#[derive(Debug, Clone)]
pub struct StockReserved {
    pub order_id: EntityId,
    pub product_id: EntityId,
    pub quantity: u32,
    pub remaining: u32,
}

impl DomainEvent for StockReserved {}
