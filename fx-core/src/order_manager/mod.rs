//! Order Manager (spec §4.1): accepts new orders, owns the in-process order
//! book, reserves and releases funds through the external Account Manager,
//! and records fills reported by the Execution Engine.

pub mod book;
pub mod expiry;
pub mod manager;

pub use book::{BookEntry, OrderBook, OrderBookSide};
pub use manager::{CreateOrderParams, ModifyOrderParams, OrderFilters, OrderManager};
