//! Events recorded by the order aggregate.

use common::{DomainEvent, EntityId};

/// Quantity of one product an order asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedLine {
    pub product_id: EntityId,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct OrderPlaced {
    pub order_id: EntityId,
    pub customer: String,
    pub lines: Vec<PlacedLine>,
    pub total_cents: i64,
}

impl DomainEvent for OrderPlaced {}
