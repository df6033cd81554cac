//! Saga reserving stock for placed orders.

use std::sync::Arc;

use bus::{Saga, SagaEvents, SagaOwner};
use common::CommandRef;
use futures_util::StreamExt;
use futures_util::stream;

use super::OrderPlaced;
use crate::catalog::ReserveStock;

/// Emits one [`ReserveStock`] per line of every placed order.
pub struct StockReservation;

impl StockReservation {
    pub const RESERVE_STOCK: &'static str = "reserve_stock";

    fn reserve_stock() -> Saga {
        Saga::new(|events: SagaEvents| {
            events
                .flat_map(|event| {
                    let commands: Vec<Option<CommandRef>> = event
                        .downcast_ref::<OrderPlaced>()
                        .map(|placed| {
                            placed
                                .lines
                                .iter()
                                .map(|line| {
                                    Some(Arc::new(ReserveStock {
                                        order_id: placed.order_id,
                                        product_id: line.product_id,
                                        quantity: line.quantity,
                                    }) as CommandRef)
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    stream::iter(commands)
                })
                .boxed()
        })
    }
}

impl SagaOwner for StockReservation {
    fn saga(&self, name: &str) -> Option<Saga> {
        match name {
            Self::RESERVE_STOCK => Some(Self::reserve_stock()),
            _ => None,
        }
    }
}
