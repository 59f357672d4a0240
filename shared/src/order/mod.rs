//! Order Domain Module
//!
//! This module provides the order-side domain types:
//! - Types: orders, installments and the request/notification payloads
//! - State: the explicit order state machine (state × event → state)

pub mod state;
pub mod types;

// Re-exports
pub use state::{IllegalTransition, OrderState, OrderTransition};
pub use types::*;
