//! Product catalog: the product aggregate, its commands and its events.

pub mod commands;
pub mod events;
pub mod product;

pub use commands::{
    ChangeProductStatus, ChangeProductStatusHandler, CreateProduct, CreateProductHandler,
    ReserveStock, ReserveStockHandler,
};
pub use events::{ProductCreated, ProductStatusChanged, StockReserved};
pub use product::{Price, Product, ProductStatus, ProductView};
