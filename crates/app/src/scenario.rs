//! Scripted storefront session driving every part of the runtime.

use common::EntityId;
use serde::Serialize;

use crate::audit::AuditEntry;
use crate::catalog::{ChangeProductStatus, CreateProduct, ProductStatus, ProductView};
use crate::error::AppError;
use crate::orders::{OrderLineRequest, PlaceOrder};
use crate::runtime::{FailureRecord, Runtime};

/// What happened during [`run`].
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub orders: Vec<EntityId>,
    /// Commands the dispatcher returned an error for.
    pub rejected: Vec<String>,
    pub products: Vec<ProductView>,
    pub audit: Vec<AuditEntry>,
    /// Failures reported on the unhandled-exception channel.
    pub failures: Vec<FailureRecord>,
}

fn product(sku: &str, name: &str, price_cents: i64, stock: u32) -> CreateProduct {
    CreateProduct {
        sku: sku.to_string(),
        name: name.to_string(),
        price_cents,
        currency: "USD".to_string(),
        stock,
    }
}

/// Runs the session:
/// 1. creates two products and rejects an invalid one
/// 2. activates both products
/// 3. places an order the reservation saga can fulfil
/// 4. places an order that outruns the remaining stock
/// 5. attempts an illegal status change
pub async fn run(runtime: &Runtime) -> Result<ScenarioReport, AppError> {
    let mut rejected = Vec::new();

    let keyboard: EntityId = runtime
        .execute_as(product("KB-01", "Mechanical keyboard", 4999, 10))
        .await?;
    let mouse: EntityId = runtime
        .execute_as(product("MS-02", "Wireless mouse", 1999, 2))
        .await?;
    if let Err(error) = runtime.execute(product("bad sku", "", 0, 1)).await {
        rejected.push(error.to_string());
    }

    for product_id in [keyboard, mouse] {
        runtime
            .execute(ChangeProductStatus {
                product_id,
                status: ProductStatus::Active,
            })
            .await?;
    }

    let first: EntityId = runtime
        .execute_as(PlaceOrder {
            customer: "ada".to_string(),
            lines: vec![
                OrderLineRequest {
                    product_id: keyboard,
                    quantity: 3,
                },
                OrderLineRequest {
                    product_id: mouse,
                    quantity: 1,
                },
            ],
        })
        .await?;
    runtime.settle().await;

    let second: EntityId = runtime
        .execute_as(PlaceOrder {
            customer: "grace".to_string(),
            lines: vec![OrderLineRequest {
                product_id: mouse,
                quantity: 2,
            }],
        })
        .await?;
    runtime.settle().await;

    if let Err(error) = runtime
        .execute(ChangeProductStatus {
            product_id: keyboard,
            status: ProductStatus::Archived,
        })
        .await
    {
        rejected.push(error.to_string());
    }
    runtime.settle().await;

    Ok(ScenarioReport {
        orders: vec![first, second],
        rejected,
        products: runtime.product_views().await,
        audit: runtime.audit_trail(),
        failures: runtime.failures(),
    })
}
