//! Integration tests for the storefront runtime.
//!
//! Every test builds a fresh `Runtime` and drives it through the command
//! dispatcher only, the way the binary does.

use std::sync::Arc;

use app::catalog::{ChangeProductStatus, CreateProduct, ProductStatus};
use app::orders::{OrderLineRequest, PlaceOrder};
use app::{AppError, Config, Runtime, scenario};
use bus::BusError;
use common::EntityId;
use domain::DomainError;
use parking_lot::Mutex;

fn create(sku: &str, stock: u32) -> CreateProduct {
    CreateProduct {
        sku: sku.to_string(),
        name: format!("Product {sku}"),
        price_cents: 1500,
        currency: "EUR".to_string(),
        stock,
    }
}

async fn active_product(runtime: &Runtime, sku: &str, stock: u32) -> EntityId {
    let product_id: EntityId = runtime.execute_as(create(sku, stock)).await.unwrap();
    runtime
        .execute(ChangeProductStatus {
            product_id,
            status: ProductStatus::Active,
        })
        .await
        .unwrap();
    product_id
}

fn order(customer: &str, lines: &[(EntityId, u32)]) -> PlaceOrder {
    PlaceOrder {
        customer: customer.to_string(),
        lines: lines
            .iter()
            .map(|&(product_id, quantity)| OrderLineRequest {
                product_id,
                quantity,
            })
            .collect(),
    }
}

/// Extracts the storefront error a handler failed with.
fn app_error(error: &BusError) -> &AppError {
    match error {
        BusError::Handler(source) => source
            .downcast_ref::<AppError>()
            .expect("handler error should be an AppError"),
        other => panic!("expected a handler failure, got {other:?}"),
    }
}

mod catalog {
    use super::*;

    #[tokio::test]
    async fn creates_and_activates_product() {
        let runtime = Runtime::build(&Config::default()).unwrap();

        let product_id: EntityId = runtime.execute_as(create("KB-01", 4)).await.unwrap();
        let status: ProductStatus = runtime
            .execute_as(ChangeProductStatus {
                product_id,
                status: ProductStatus::Active,
            })
            .await
            .unwrap();
        runtime.settle().await;

        assert_eq!(status, ProductStatus::Active);
        let views = runtime.product_views().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, product_id);
        assert_eq!(views[0].status, ProductStatus::Active);
        assert_eq!(
            runtime.audit_log().event_types(),
            vec!["ProductCreated", "ProductStatusChanged"]
        );
    }

    #[tokio::test]
    async fn invalid_product_reports_broken_rules() {
        let runtime = Runtime::build(&Config::default()).unwrap();

        let error = runtime
            .execute(CreateProduct {
                sku: String::new(),
                name: " ".to_string(),
                price_cents: -1,
                currency: "EUR".to_string(),
                stock: 0,
            })
            .await
            .unwrap_err();

        match app_error(&error) {
            AppError::Validation { messages } => {
                assert!(messages.contains(&"name: Name is required".to_string()));
                assert!(messages.contains(&"sku: SKU is required".to_string()));
                assert!(messages.contains(&"price: Price must be positive".to_string()));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert!(runtime.products().is_empty().await);
    }

    #[tokio::test]
    async fn malformed_currency_fails_the_guard() {
        let runtime = Runtime::build(&Config::default()).unwrap();

        let mut command = create("KB-01", 1);
        command.currency = "euro".to_string();
        let error = runtime.execute(command).await.unwrap_err();

        assert!(matches!(
            app_error(&error),
            AppError::Domain(DomainError::Guard { .. })
        ));
    }

    #[tokio::test]
    async fn illegal_transition_keeps_status() {
        let runtime = Runtime::build(&Config::default()).unwrap();
        let product_id = active_product(&runtime, "KB-01", 1).await;

        let error = runtime
            .execute(ChangeProductStatus {
                product_id,
                status: ProductStatus::Archived,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            app_error(&error),
            AppError::Domain(DomainError::Transition(_))
        ));
        let stored = runtime.products().get(product_id).await.unwrap();
        assert_eq!(stored.props().status, ProductStatus::Active);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let runtime = Runtime::build(&Config::default()).unwrap();
        let missing = EntityId::new();

        let error = runtime
            .execute(ChangeProductStatus {
                product_id: missing,
                status: ProductStatus::Active,
            })
            .await
            .unwrap_err();

        assert!(matches!(app_error(&error), AppError::ProductNotFound(id) if *id == missing));
    }
}

mod orders {
    use super::*;

    #[tokio::test]
    async fn placed_order_reserves_stock_through_saga() {
        let runtime = Runtime::build(&Config::default()).unwrap();
        let keyboard = active_product(&runtime, "KB-01", 10).await;
        let mouse = active_product(&runtime, "MS-02", 5).await;

        let order_id: EntityId = runtime
            .execute_as(order("ada", &[(keyboard, 3), (mouse, 1)]))
            .await
            .unwrap();
        runtime.settle().await;

        let stored = runtime.orders().get(order_id).await.unwrap();
        assert_eq!(stored.props().total_cents(), 4 * 1500);

        let stock: Vec<(String, u32)> = runtime
            .product_views()
            .await
            .into_iter()
            .map(|view| (view.sku, view.stock))
            .collect();
        assert_eq!(
            stock,
            vec![("KB-01".to_string(), 7), ("MS-02".to_string(), 4)]
        );

        let reserved = runtime
            .audit_log()
            .event_types()
            .into_iter()
            .filter(|event_type| *event_type == "StockReserved")
            .count();
        assert_eq!(reserved, 2);
        assert!(runtime.failures().is_empty());
    }

    #[tokio::test]
    async fn draft_product_cannot_be_ordered() {
        let runtime = Runtime::build(&Config::default()).unwrap();
        let draft: EntityId = runtime.execute_as(create("KB-01", 3)).await.unwrap();

        let error = runtime
            .execute(order("ada", &[(draft, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(
            app_error(&error),
            AppError::ProductUnavailable {
                status: ProductStatus::Draft,
                ..
            }
        ));
        assert!(runtime.orders().is_empty().await);
    }

    #[tokio::test]
    async fn zero_quantity_line_is_invalid() {
        let runtime = Runtime::build(&Config::default()).unwrap();
        let keyboard = active_product(&runtime, "KB-01", 3).await;

        let error = runtime
            .execute(order("ada", &[(keyboard, 0)]))
            .await
            .unwrap_err();

        match app_error(&error) {
            AppError::Validation { messages } => {
                assert_eq!(messages, &vec!["quantity: Quantity must be at least 1".to_string()]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overselling_is_reported_on_the_unhandled_channel() {
        let runtime = Runtime::build(&Config::default()).unwrap();
        let mouse = active_product(&runtime, "MS-02", 1).await;
        let shortages = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let shortages = Arc::clone(&shortages);
            runtime
                .events()
                .unhandled()
                .of_type::<AppError>()
                .subscribe(move |info| {
                    if let Some(AppError::InsufficientStock {
                        requested,
                        available,
                        ..
                    }) = info.downcast_ref::<AppError>()
                    {
                        shortages.lock().push((*requested, *available));
                    }
                })
        };

        runtime
            .execute(order("grace", &[(mouse, 2)]))
            .await
            .unwrap();
        runtime.settle().await;

        assert_eq!(*shortages.lock(), vec![(2, 1)]);
        let failures = runtime.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].cause, "ReserveStock");
        assert_eq!(
            failures[0].error,
            "Insufficient stock for MS-02: requested 2, available 1"
        );
        let stored = runtime.products().get(mouse).await.unwrap();
        assert_eq!(stored.props().stock, 1);
        assert!(subscription.unsubscribe());
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn scenario_report() {
        let runtime = Runtime::build(&Config::default()).unwrap();

        let report = scenario::run(&runtime).await.unwrap();

        assert_eq!(report.orders.len(), 2);
        assert_eq!(report.rejected.len(), 2);
        assert!(report.rejected[0].starts_with("Command handler failed: Validation failed"));
        assert!(report.rejected[1].contains("Invalid transition from Active to Archived"));

        let stock: Vec<(&str, u32, ProductStatus)> = report
            .products
            .iter()
            .map(|view| (view.sku.as_str(), view.stock, view.status))
            .collect();
        assert_eq!(
            stock,
            vec![
                ("KB-01", 7, ProductStatus::Active),
                ("MS-02", 1, ProductStatus::Active),
            ]
        );

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].cause, "ReserveStock");

        let count = |name: &str| {
            report
                .audit
                .iter()
                .filter(|entry| entry.event_type == name)
                .count()
        };
        assert_eq!(count("ProductCreated"), 2);
        assert_eq!(count("ProductStatusChanged"), 2);
        assert_eq!(count("OrderPlaced"), 2);
        assert_eq!(count("StockReserved"), 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["products"][0]["status"], "Active");
    }

    #[tokio::test]
    async fn registry_declares_every_handler() {
        let runtime = Runtime::build(&Config::default()).unwrap();

        let registry = runtime.registry();
        assert_eq!(registry.command_handler_types().len(), 4);
        assert_eq!(registry.event_handler_types().len(), 1);
        assert_eq!(registry.saga_owner_types().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_releases_event_subscriptions() {
        let runtime = Runtime::build(&Config::default()).unwrap();
        active_product(&runtime, "KB-01", 1).await;

        // audit log + reservation saga
        assert_eq!(runtime.events().subscription_count(), 2);
        assert_eq!(runtime.shutdown().await, 2);
    }
}
