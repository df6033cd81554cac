//! Catalog commands and their handlers.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{CommandHandler, CommandOutput, EventChannel, HandlerError, downcast_command};
use common::{Command, CommandRef, EntityId};
use domain::{AggregateRoot, DomainError, TransitionGraph, ValueObject};

use super::{Price, Product, ProductCreated, ProductStatus, ProductStatusChanged, StockReserved};
use crate::error::AppError;
use crate::repository::InMemoryRepository;

/// Adds a product to the catalog in Draft status.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub stock: u32,
}

impl Command for CreateProduct {}

#[derive(Debug, Clone)]
pub struct ChangeProductStatus {
    pub product_id: EntityId,
    pub status: ProductStatus,
}

impl Command for ChangeProductStatus {}

/// Takes `quantity` units of a product out of stock for an order.
#[derive(Debug, Clone)]
pub struct ReserveStock {
    pub order_id: EntityId,
    pub product_id: EntityId,
    pub quantity: u32,
}

impl Command for ReserveStock {}

/// Persists `aggregate` and hands its recorded events to `stream`.
pub(crate) async fn save_and_commit<P: domain::Props>(
    repository: &InMemoryRepository<P>,
    stream: &EventChannel,
    aggregate: &mut AggregateRoot<P>,
) -> Result<usize, AppError> {
    repository.save(aggregate).await;
    aggregate.merge_publisher(Arc::new(stream.clone()));
    Ok(aggregate.commit()?)
}

pub struct CreateProductHandler {
    products: Arc<InMemoryRepository<Product>>,
    stream: EventChannel,
}

impl CreateProductHandler {
    pub fn new(products: Arc<InMemoryRepository<Product>>, stream: EventChannel) -> Self {
        Self { products, stream }
    }

    async fn create(&self, command: &CreateProduct) -> Result<EntityId, AppError> {
        let price = ValueObject::create(Price {
            cents: command.price_cents,
            currency: command.currency.clone(),
        })?;
        let mut product = AggregateRoot::create(Product {
            sku: command.sku.clone(),
            name: command.name.clone(),
            price,
            stock: command.stock,
            status: ProductStatus::Draft,
        })?;
        if !product.is_valid() {
            return Err(AppError::validation(product.broken_rules()));
        }

        let product_id = product.id();
        product.add_domain_event(ProductCreated {
            product_id,
            sku: command.sku.clone(),
        });
        save_and_commit(&self.products, &self.stream, &mut product).await?;

        tracing::info!(%product_id, sku = %command.sku, "product created");
        Ok(product_id)
    }
}

#[async_trait]
impl CommandHandler for CreateProductHandler {
    async fn execute(&self, command: CommandRef) -> Result<CommandOutput, HandlerError> {
        let create = downcast_command::<CreateProduct>(command.as_ref())?;
        let product_id = self.create(create).await?;
        Ok(Box::new(product_id))
    }
}

pub struct ChangeProductStatusHandler {
    products: Arc<InMemoryRepository<Product>>,
    stream: EventChannel,
    transitions: TransitionGraph<ProductStatus>,
}

impl ChangeProductStatusHandler {
    pub fn new(
        products: Arc<InMemoryRepository<Product>>,
        stream: EventChannel,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            products,
            stream,
            transitions: ProductStatus::transitions()?,
        })
    }

    async fn change(&self, command: &ChangeProductStatus) -> Result<ProductStatus, AppError> {
        let mut product = self
            .products
            .get(command.product_id)
            .await
            .ok_or(AppError::ProductNotFound(command.product_id))?;

        let from = product.props().status;
        self.transitions
            .validate_transition(&from, &command.status)
            .map_err(DomainError::from)?;

        let to = command.status;
        product.update(|props| props.status = to)?;
        product.add_domain_event(ProductStatusChanged {
            product_id: command.product_id,
            from,
            to,
        });
        save_and_commit(&self.products, &self.stream, &mut product).await?;

        tracing::info!(product_id = %command.product_id, %from, %to, "product status changed");
        Ok(to)
    }
}

#[async_trait]
impl CommandHandler for ChangeProductStatusHandler {
    async fn execute(&self, command: CommandRef) -> Result<CommandOutput, HandlerError> {
        let change = downcast_command::<ChangeProductStatus>(command.as_ref())?;
        let status = self.change(change).await?;
        Ok(Box::new(status))
    }
}

pub struct ReserveStockHandler {
    products: Arc<InMemoryRepository<Product>>,
    stream: EventChannel,
}

impl ReserveStockHandler {
    pub fn new(products: Arc<InMemoryRepository<Product>>, stream: EventChannel) -> Self {
        Self { products, stream }
    }

    async fn reserve(&self, command: &ReserveStock) -> Result<u32, AppError> {
        let mut product = self
            .products
            .get(command.product_id)
            .await
            .ok_or(AppError::ProductNotFound(command.product_id))?;

        let available = product.props().stock;
        if command.quantity > available {
            return Err(AppError::InsufficientStock {
                sku: product.props().sku.clone(),
                requested: command.quantity,
                available,
            });
        }

        let remaining = available - command.quantity;
        product.update(|props| props.stock = remaining)?;
        product.add_domain_event(StockReserved {
            order_id: command.order_id,
            product_id: command.product_id,
            quantity: command.quantity,
            remaining,
        });
        save_and_commit(&self.products, &self.stream, &mut product).await?;

        metrics::counter!("storefront_units_reserved_total").increment(u64::from(command.quantity));
        tracing::debug!(
            order_id = %command.order_id,
            product_id = %command.product_id,
            quantity = command.quantity,
            remaining,
            "stock reserved"
        );
        Ok(remaining)
    }
}

#[async_trait]
impl CommandHandler for ReserveStockHandler {
    async fn execute(&self, command: CommandRef) -> Result<CommandOutput, HandlerError> {
        let reserve = downcast_command::<ReserveStock>(command.as_ref())?;
        let remaining = self.reserve(reserve).await?;
        Ok(Box::new(remaining))
    }
}
