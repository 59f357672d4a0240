//! Invoice and credit-note ledger
//!
//! Invoices form a tree of depth at most 2: one parent-less root per order
//! (strictly positive total), and credit notes (negative total) that always
//! reference the root directly. Balances are derived, never stored:
//!
//! - `invoiced_balance`: signed sum of totals over the invoice + children
//! - `transactions_balance`: signed sum of settled transactions over the
//!   same subtree
//! - `balance`: invoiced minus settled; zero means the books are square
//!
//! Every write validates first, persists second; nothing invalid is ever
//! committed.

pub mod references;

use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::models::{Invoice, InvoiceBalances, InvoiceState, Transaction};
use shared::order::Order;
use thiserror::Error;
use tracing::debug;

use crate::storage::{LedgerStorage, StorageError};

pub use references::ReferenceSequencer;

/// Invoice ledger errors
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("order {0} already has a root invoice")]
    RootAlreadyExists(String),

    #[error("root invoice total must be positive, got {0}")]
    NonPositiveRootTotal(Decimal),

    #[error("credit note amount must be positive, got {0}")]
    NonPositiveCreditNote(Decimal),

    #[error("credit note of {requested} exceeds invoiced balance {available} on {reference}")]
    CreditNoteExceedsBalance {
        reference: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("invoice {0} is a credit note and cannot take children")]
    InvalidHierarchy(String),

    #[error("unknown invoice {0}")]
    UnknownInvoice(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type InvoiceResult<T> = Result<T, InvoiceError>;

/// Ledger over the invoice tree of every order
#[derive(Clone)]
pub struct InvoiceLedger {
    storage: LedgerStorage,
}

impl InvoiceLedger {
    pub fn new(storage: LedgerStorage) -> Self {
        Self { storage }
    }

    /// Materialize the root invoice for an order at price freeze.
    ///
    /// At most one root exists per order; a second call fails before
    /// anything is written.
    pub fn create_root(&self, txn: &WriteTransaction, order: &Order) -> InvoiceResult<Invoice> {
        if order.total <= Decimal::ZERO {
            return Err(InvoiceError::NonPositiveRootTotal(order.total));
        }
        if let Some(existing) = self.storage.root_invoice_for_order_txn(txn, &order.id)? {
            debug!(order_id = %order.id, reference = %existing, "root invoice already exists");
            return Err(InvoiceError::RootAlreadyExists(order.id.clone()));
        }

        let invoice = Invoice {
            reference: references::timestamp_reference(),
            parent: None,
            order_id: order.id.clone(),
            total: order.total,
            created_at: shared::util::now_millis(),
        };
        self.storage.put_invoice(txn, &invoice)?;
        Ok(invoice)
    }

    /// Issue a credit note of `amount` (positive magnitude) against a root.
    ///
    /// Rejected when the parent is itself a credit note, or when the new
    /// note would push the subtree's invoiced balance below zero.
    pub fn create_credit_note(
        &self,
        txn: &WriteTransaction,
        parent_reference: &str,
        amount: Decimal,
    ) -> InvoiceResult<Invoice> {
        if amount <= Decimal::ZERO {
            return Err(InvoiceError::NonPositiveCreditNote(amount));
        }
        let parent = self
            .storage
            .get_invoice_txn(txn, parent_reference)?
            .ok_or_else(|| InvoiceError::UnknownInvoice(parent_reference.to_string()))?;
        if parent.parent.is_some() {
            return Err(InvoiceError::InvalidHierarchy(parent_reference.to_string()));
        }

        let available = self.invoiced_balance_txn(txn, &parent)?;
        if amount > available {
            return Err(InvoiceError::CreditNoteExceedsBalance {
                reference: parent_reference.to_string(),
                requested: amount,
                available,
            });
        }

        let note = Invoice {
            reference: references::timestamp_reference(),
            parent: Some(parent.reference.clone()),
            order_id: parent.order_id.clone(),
            total: -amount,
            created_at: shared::util::now_millis(),
        };
        self.storage.put_invoice(txn, &note)?;
        Ok(note)
    }

    /// Attach a settled transaction (signed) to an invoice
    pub fn record_transaction(
        &self,
        txn: &WriteTransaction,
        invoice_reference: &str,
        reference: &str,
        total: Decimal,
    ) -> InvoiceResult<Transaction> {
        if self.storage.get_invoice_txn(txn, invoice_reference)?.is_none() {
            return Err(InvoiceError::UnknownInvoice(invoice_reference.to_string()));
        }
        let transaction = Transaction {
            reference: reference.to_string(),
            invoice_reference: invoice_reference.to_string(),
            total,
            created_at: shared::util::now_millis(),
        };
        self.storage.put_transaction(txn, &transaction)?;
        Ok(transaction)
    }

    /// Derive the balances and state of an invoice subtree
    pub fn balances(&self, reference: &str) -> InvoiceResult<InvoiceBalances> {
        let invoice = self
            .storage
            .get_invoice(reference)?
            .ok_or_else(|| InvoiceError::UnknownInvoice(reference.to_string()))?;

        let mut subtree = vec![invoice];
        subtree.extend(self.storage.children_of(reference)?);

        let invoiced_balance: Decimal = subtree.iter().map(|i| i.total).sum();
        let mut transactions_balance = Decimal::ZERO;
        for invoice in &subtree {
            for transaction in self.storage.transactions_for_invoice(&invoice.reference)? {
                transactions_balance += transaction.total;
            }
        }

        let balance = invoiced_balance - transactions_balance;
        Ok(InvoiceBalances {
            reference: reference.to_string(),
            invoiced_balance,
            transactions_balance,
            balance,
            state: InvoiceState::derive(invoiced_balance, balance),
        })
    }

    /// Invoiced balance of a root's subtree inside the current transaction,
    /// used to bound credit notes against concurrent writes
    fn invoiced_balance_txn(&self, txn: &WriteTransaction, root: &Invoice) -> InvoiceResult<Decimal> {
        let mut sum = root.total;
        for child in self.storage.children_of_txn(txn, &root.reference)? {
            sum += child.total;
        }
        Ok(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn ledger() -> (InvoiceLedger, LedgerStorage) {
        let storage = LedgerStorage::open_in_memory().unwrap();
        (InvoiceLedger::new(storage.clone()), storage)
    }

    fn make_order(total: &str) -> Order {
        Order::new("user-1", "off-1", dec(total), "EUR")
    }

    fn create_root(ledger: &InvoiceLedger, storage: &LedgerStorage, order: &Order) -> Invoice {
        let txn = storage.begin_write().unwrap();
        let root = ledger.create_root(&txn, order).unwrap();
        txn.commit().unwrap();
        root
    }

    #[test]
    fn one_root_per_order() {
        let (ledger, storage) = ledger();
        let order = make_order("100.00");
        create_root(&ledger, &storage, &order);

        let txn = storage.begin_write().unwrap();
        let second = ledger.create_root(&txn, &order);
        assert!(matches!(second, Err(InvoiceError::RootAlreadyExists(_))));
    }

    #[test]
    fn root_total_must_be_positive() {
        let (ledger, storage) = ledger();
        let order = make_order("0.00");
        let txn = storage.begin_write().unwrap();
        assert!(matches!(
            ledger.create_root(&txn, &order),
            Err(InvoiceError::NonPositiveRootTotal(_))
        ));
    }

    #[test]
    fn credit_note_bounded_by_invoiced_balance() {
        let (ledger, storage) = ledger();
        let order = make_order("100.00");
        let root = create_root(&ledger, &storage, &order);

        let txn = storage.begin_write().unwrap();
        ledger
            .create_credit_note(&txn, &root.reference, dec("60.00"))
            .unwrap();
        // 60 已冲销,余 40,再冲 50 必须拒绝
        let over = ledger.create_credit_note(&txn, &root.reference, dec("50.00"));
        assert!(matches!(
            over,
            Err(InvoiceError::CreditNoteExceedsBalance { .. })
        ));
        // the remaining 40 still goes through
        ledger
            .create_credit_note(&txn, &root.reference, dec("40.00"))
            .unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn credit_note_cannot_hang_off_a_credit_note() {
        let (ledger, storage) = ledger();
        let order = make_order("100.00");
        let root = create_root(&ledger, &storage, &order);

        let txn = storage.begin_write().unwrap();
        let note = ledger
            .create_credit_note(&txn, &root.reference, dec("20.00"))
            .unwrap();
        let nested = ledger.create_credit_note(&txn, &note.reference, dec("5.00"));
        assert!(matches!(nested, Err(InvoiceError::InvalidHierarchy(_))));
    }

    #[test]
    fn balances_walk_the_full_cycle() {
        let (ledger, storage) = ledger();
        let order = make_order("100.00");
        let root = create_root(&ledger, &storage, &order);

        // unpaid at first
        let snapshot = ledger.balances(&root.reference).unwrap();
        assert_eq!(snapshot.balance, dec("100.00"));
        assert_eq!(snapshot.state, InvoiceState::Unpaid);

        // settle in full
        let txn = storage.begin_write().unwrap();
        ledger
            .record_transaction(&txn, &root.reference, "pay-1", dec("100.00"))
            .unwrap();
        txn.commit().unwrap();
        let snapshot = ledger.balances(&root.reference).unwrap();
        assert_eq!(snapshot.balance, Decimal::ZERO);
        assert_eq!(snapshot.state, InvoiceState::Paid);

        // reverse in full: credit note plus matching refund transaction
        let txn = storage.begin_write().unwrap();
        let note = ledger
            .create_credit_note(&txn, &root.reference, dec("100.00"))
            .unwrap();
        ledger
            .record_transaction(&txn, &note.reference, "ref-1", dec("-100.00"))
            .unwrap();
        txn.commit().unwrap();

        let snapshot = ledger.balances(&root.reference).unwrap();
        assert_eq!(snapshot.invoiced_balance, Decimal::ZERO);
        assert_eq!(snapshot.transactions_balance, Decimal::ZERO);
        assert_eq!(snapshot.balance, Decimal::ZERO);
        assert_eq!(snapshot.state, InvoiceState::Refunded);
    }

    #[test]
    fn unknown_invoice_is_an_error() {
        let (ledger, _storage) = ledger();
        assert!(matches!(
            ledger.balances("missing"),
            Err(InvoiceError::UnknownInvoice(_))
        ));
    }

    #[test]
    fn transaction_requires_existing_invoice() {
        let (ledger, storage) = ledger();
        let txn = storage.begin_write().unwrap();
        let result = ledger.record_transaction(&txn, "missing", "pay-1", dec("10.00"));
        assert!(matches!(result, Err(InvoiceError::UnknownInvoice(_))));
    }
}
