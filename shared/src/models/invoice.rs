//! Invoice and Transaction Models

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Invoice entity
///
/// Invoices form a tree of depth at most 2: a root invoice has no parent
/// and a strictly positive total; every other invoice (credit note,
/// negative total) references the root directly, never another child.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    /// Business reference, also the storage key
    pub reference: String,
    /// Root invoices have no parent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Order the invoice belongs to
    pub order_id: String,
    /// Signed total: positive = payment invoice, negative = credit note
    pub total: Decimal,
    /// Creation timestamp (Unix millis)
    pub created_at: i64,
}

impl Invoice {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_credit_note(&self) -> bool {
        self.total < Decimal::ZERO
    }
}

/// Settled payment (or payout) attached to an invoice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Business reference, also the storage key
    pub reference: String,
    /// Invoice the money settled against
    pub invoice_reference: String,
    /// Signed amount: positive = money in, negative = refund payout
    pub total: Decimal,
    /// Creation timestamp (Unix millis)
    pub created_at: i64,
}

/// Derived invoice state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceState {
    /// Declared amounts fully settled
    Paid,
    /// Everything declared was reversed and paid back out
    Refunded,
    /// Money still owed
    Unpaid,
}

impl InvoiceState {
    /// Derive the state from subtree balances.
    ///
    /// `invoiced` is the signed sum of totals over the invoice and its
    /// children; `balance` is `invoiced − transactions`.
    pub fn derive(invoiced: Decimal, balance: Decimal) -> Self {
        if balance.is_zero() {
            if invoiced > Decimal::ZERO {
                InvoiceState::Paid
            } else {
                InvoiceState::Refunded
            }
        } else {
            InvoiceState::Unpaid
        }
    }
}

/// Balance snapshot over an invoice subtree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceBalances {
    pub reference: String,
    /// Signed sum of invoice totals (root + children)
    pub invoiced_balance: Decimal,
    /// Signed sum of settled transactions across the subtree
    pub transactions_balance: Decimal,
    /// `invoiced_balance − transactions_balance`
    pub balance: Decimal,
    pub state: InvoiceState,
}
