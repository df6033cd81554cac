//! Composition root wiring the storefront onto the dispatch runtime.

use std::any::Any;
use std::sync::Arc;

use bus::{
    BusError, CommandDispatcher, CommandOutput, EventChannel, EventDispatcher, Registry,
    Subscription, UnhandledExceptionChannel, UnhandledExceptionInfo,
};
use chrono::{DateTime, Utc};
use common::Command;
use parking_lot::Mutex;
use serde::Serialize;

use crate::audit::{AuditEntry, AuditLog};
use crate::catalog::{
    ChangeProductStatus, ChangeProductStatusHandler, CreateProduct, CreateProductHandler, Product,
    ProductView, ReserveStock, ReserveStockHandler,
};
use crate::config::Config;
use crate::error::AppError;
use crate::orders::{Order, PlaceOrder, PlaceOrderHandler, StockReservation};
use crate::repository::InMemoryRepository;

/// A failure reported on the unhandled-exception channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub cause: &'static str,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&UnhandledExceptionInfo> for FailureRecord {
    fn from(info: &UnhandledExceptionInfo) -> Self {
        Self {
            cause: info.cause.name(),
            error: info.exception.to_string(),
            occurred_at: info.occurred_at,
        }
    }
}

/// The running storefront: repositories, both dispatchers and the
/// observers attached to them.
pub struct Runtime {
    products: Arc<InMemoryRepository<Product>>,
    orders: Arc<InMemoryRepository<Order>>,
    registry: Arc<Registry>,
    commands: Arc<CommandDispatcher>,
    events: EventDispatcher,
    audit: AuditLog,
    failures: Arc<Mutex<Vec<FailureRecord>>>,
    failure_log: Subscription,
}

impl Runtime {
    /// Builds the registry and both dispatchers, then registers every
    /// declared handler and saga.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(config: &Config) -> Result<Self, AppError> {
        let stream = EventChannel::new();
        let products = Arc::new(InMemoryRepository::new());
        let orders = Arc::new(InMemoryRepository::new());
        let audit = AuditLog::new();

        let registry = Arc::new(
            Registry::builder()
                .command_handler::<CreateProduct, _>(CreateProductHandler::new(
                    Arc::clone(&products),
                    stream.clone(),
                ))
                .command_handler::<ChangeProductStatus, _>(ChangeProductStatusHandler::new(
                    Arc::clone(&products),
                    stream.clone(),
                )?)
                .command_handler::<ReserveStock, _>(ReserveStockHandler::new(
                    Arc::clone(&products),
                    stream.clone(),
                ))
                .command_handler::<PlaceOrder, _>(PlaceOrderHandler::new(
                    Arc::clone(&orders),
                    Arc::clone(&products),
                    stream.clone(),
                ))
                .broadcast_handler(audit.clone())
                .saga_owner(StockReservation, [StockReservation::RESERVE_STOCK])
                .build(),
        );

        let commands = Arc::new(CommandDispatcher::new(registry.clone(), registry.clone()));
        let bound = commands.register(registry.command_handler_types())?;

        let unhandled = UnhandledExceptionChannel::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let failure_log = {
            let failures = Arc::clone(&failures);
            unhandled.subscribe(move |info: &UnhandledExceptionInfo| {
                tracing::warn!(
                    cause = info.cause.name(),
                    error = %info.exception,
                    "unhandled exception"
                );
                failures.lock().push(FailureRecord::from(info));
            })
        };

        let events = EventDispatcher::with_stream(
            stream,
            Arc::clone(&commands),
            unhandled,
            registry.clone(),
            registry.clone(),
            config.bus.clone(),
        );
        let handlers = events.register(registry.event_handler_types());
        let sagas = events.register_sagas(registry.saga_owner_types())?;

        tracing::info!(
            command_handlers = bound,
            event_handlers = handlers,
            sagas,
            saga_hop_limit = config.bus.saga_hop_limit,
            "runtime ready"
        );

        Ok(Self {
            products,
            orders,
            registry,
            commands,
            events,
            audit,
            failures,
            failure_log,
        })
    }

    /// Executes `command` and returns its raw output.
    pub async fn execute<C: Command>(&self, command: C) -> Result<CommandOutput, BusError> {
        self.commands.execute(Arc::new(command)).await
    }

    /// Executes `command` and downcasts its output to `R`.
    pub async fn execute_as<C: Command, R: Any>(&self, command: C) -> Result<R, BusError> {
        self.commands.execute_as::<R>(Arc::new(command)).await
    }

    /// Waits until every published event, and every saga reaction to it,
    /// has been processed.
    pub async fn settle(&self) {
        self.events.flush().await;
    }

    pub fn products(&self) -> &InMemoryRepository<Product> {
        &self.products
    }

    pub fn orders(&self) -> &InMemoryRepository<Order> {
        &self.orders
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Returns every stored product, ordered by SKU.
    pub async fn product_views(&self) -> Vec<ProductView> {
        let mut views: Vec<ProductView> = self
            .products
            .all()
            .await
            .iter()
            .map(|(id, product)| ProductView::new(*id, product))
            .collect();
        views.sort_by(|a, b| a.sku.cmp(&b.sku));
        views
    }

    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures.lock().clone()
    }

    /// Settles outstanding work, then releases every subscription.
    ///
    /// Returns the number of event-side subscriptions released.
    pub async fn shutdown(self) -> usize {
        self.settle().await;
        let released = self.events.on_teardown();
        self.failure_log.unsubscribe();
        tracing::info!(released, "runtime shut down");
        released
    }
}
