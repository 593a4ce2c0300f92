//! Infrastructure layer: storage, warehouse directory, config, and the
//! stock move service that ties them to the domain.

pub mod config;
pub mod service;
pub mod store;
pub mod warehouses;

#[cfg(test)]
mod integration_tests;

pub use config::ServiceConfig;
pub use service::{MoveHistoryEntry, NewStockMove, ServiceError, StockMoveService};
pub use store::{InMemoryStockStore, PostgresStockStore, StockStore, StoreError, StoredMoveEvent};
pub use warehouses::{InMemoryWarehouseDirectory, WarehouseDirectory};
