//! Order placement.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{CommandHandler, CommandOutput, EventChannel, HandlerError, downcast_command};
use common::{Command, CommandRef, EntityId};
use domain::{AggregateRoot, ValueObject};

use super::{Order, OrderLine, OrderPlaced, PlacedLine};
use crate::catalog::Product;
use crate::catalog::commands::save_and_commit;
use crate::error::AppError;
use crate::repository::InMemoryRepository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineRequest {
    pub product_id: EntityId,
    pub quantity: u32,
}

/// Places an order for Active products.
///
/// Stock is not touched here; it is reserved by the
/// [`StockReservation`](super::StockReservation) saga once the order is placed.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer: String,
    pub lines: Vec<OrderLineRequest>,
}

impl Command for PlaceOrder {}

pub struct PlaceOrderHandler {
    orders: Arc<InMemoryRepository<Order>>,
    products: Arc<InMemoryRepository<Product>>,
    stream: EventChannel,
}

impl PlaceOrderHandler {
    pub fn new(
        orders: Arc<InMemoryRepository<Order>>,
        products: Arc<InMemoryRepository<Product>>,
        stream: EventChannel,
    ) -> Self {
        Self {
            orders,
            products,
            stream,
        }
    }

    async fn place(&self, command: &PlaceOrder) -> Result<EntityId, AppError> {
        let mut lines = Vec::with_capacity(command.lines.len());
        for request in &command.lines {
            let product = self
                .products
                .get(request.product_id)
                .await
                .ok_or(AppError::ProductNotFound(request.product_id))?;
            let props = product.props();
            if !props.is_sellable() {
                return Err(AppError::ProductUnavailable {
                    product_id: request.product_id,
                    status: props.status,
                });
            }
            lines.push(ValueObject::create(OrderLine {
                product_id: request.product_id,
                sku: props.sku.clone(),
                quantity: request.quantity,
                unit_cents: props.price.props().cents,
            })?);
        }

        let mut order = AggregateRoot::create(Order {
            customer: command.customer.clone(),
            lines,
        })?;
        if !order.is_valid() {
            return Err(AppError::validation(order.broken_rules()));
        }

        let order_id = order.id();
        let total_cents = order.props().total_cents();
        order.add_domain_event(OrderPlaced {
            order_id,
            customer: command.customer.clone(),
            lines: command
                .lines
                .iter()
                .map(|line| PlacedLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                })
                .collect(),
            total_cents,
        });
        save_and_commit(&self.orders, &self.stream, &mut order).await?;

        metrics::counter!("storefront_orders_placed_total").increment(1);
        tracing::info!(%order_id, customer = %command.customer, total_cents, "order placed");
        Ok(order_id)
    }
}

#[async_trait]
impl CommandHandler for PlaceOrderHandler {
    async fn execute(&self, command: CommandRef) -> Result<CommandOutput, HandlerError> {
        let place = downcast_command::<PlaceOrder>(command.as_ref())?;
        let order_id = self.place(place).await?;
        Ok(Box::new(order_id))
    }
}
