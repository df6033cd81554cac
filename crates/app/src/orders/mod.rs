//! Orders: the order aggregate, order placement and stock reservation.

pub mod commands;
pub mod events;
pub mod order;
pub mod saga;

pub use commands::{OrderLineRequest, PlaceOrder, PlaceOrderHandler};
pub use events::{OrderPlaced, PlacedLine};
pub use order::{Order, OrderLine};
pub use saga::StockReservation;
