//! Storefront built on the DDD runtime.
//!
//! Wires products and orders onto the command and event dispatchers:
//! - `catalog`: product aggregate with a guarded status graph and stock
//! - `orders`: order aggregate and the saga reserving stock for it
//! - `runtime`: composition root building the registry and dispatchers
//! - `scenario`: scripted session used by the binary

pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod orders;
pub mod repository;
pub mod runtime;
pub mod scenario;
pub mod telemetry;

pub use config::{Config, LogFormat};
pub use error::AppError;
pub use runtime::{FailureRecord, Runtime};
pub use scenario::ScenarioReport;
