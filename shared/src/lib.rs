//! Shared types for the commerce order engine
//!
//! Domain types used across the server and API clients: orders,
//! installments, the order state machine, invoices/transactions and
//! the catalog models (offerings, capacity rules). Everything here is
//! pure data plus pure functions, with no storage and no IO.

pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Order domain re-exports (for convenient access)
pub use order::{
    IllegalTransition, Installment, InstallmentState, Order, OrderState, OrderTransition,
};
