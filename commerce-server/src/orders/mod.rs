//! Order financial engine
//!
//! This module drives an order from draft to a terminal state:
//!
//! - **manager**: OrdersManager wiring admission, submission, webhooks,
//!   cancellation and refunds
//! - **schedule**: PaymentScheduleBuilder, total → installment split
//! - **installments**: monotonic installment lifecycle ledger
//! - **money**: cent rounding helpers
//!
//! # Data Flow
//!
//! 1. Create: capacity admission, discount, organization assignment
//! 2. Submit: price freeze → schedule + root invoice, route by
//!    missing prerequisite (contract / reservation / payment method)
//! 3. Webhooks mark installments paid and advance the state machine
//! 4. Cancel, then an explicit refund pass reverses captured installments
//!
//! Invoice balances and references live in [`crate::invoicing`]; seat
//! accounting lives in [`crate::capacity`].

pub mod installments;
pub mod manager;
pub mod money;
pub mod schedule;

// Re-exports
pub use installments::{LedgerError, LedgerOutcome};
pub use manager::{ManagerError, ManagerResult, OrdersManager};
pub use schedule::{PaymentScheduleBuilder, ScheduleConfigError, ScheduleTiers};

// Re-export shared types for convenience
pub use shared::order::{
    Installment, InstallmentState, Order, OrderState, OrderTransition, PaymentNotification,
    RefundReport,
};
