//! Order aggregate.

use common::EntityId;
use domain::{BrokenRuleCollection, Component, Props, ValueObject};

/// One product line of an order, priced when the order was placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: EntityId,
    pub sku: String,
    pub quantity: u32,
    pub unit_cents: i64,
}

impl OrderLine {
    pub fn total_cents(&self) -> i64 {
        self.unit_cents * i64::from(self.quantity)
    }
}

impl Props for OrderLine {
    fn business_rules(&self, rules: &mut BrokenRuleCollection) {
        rules.add_if(self.quantity == 0, "quantity", "Quantity must be at least 1");
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub customer: String,
    pub lines: Vec<ValueObject<OrderLine>>,
}

impl Order {
    pub fn total_cents(&self) -> i64 {
        self.lines.iter().map(|line| line.props().total_cents()).sum()
    }
}

impl Props for Order {
    fn business_rules(&self, rules: &mut BrokenRuleCollection) {
        rules.add_if(
            self.customer.trim().is_empty(),
            "customer",
            "Customer is required",
        );
        rules.add_if(self.lines.is_empty(), "lines", "Order must have at least one line");
    }

    fn children(&self) -> Vec<&dyn Component> {
        self.lines
            .iter()
            .map(|line| line as &dyn Component)
            .collect()
    }
}
