//! redb-based storage layer for the order financial engine
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Order aggregate (schedule inline) |
//! | `installment_index` | `installment_id` | `order_id` | Webhook dispatch |
//! | `offerings` | `offering_id` | `Offering` | Catalog entry |
//! | `capacity_rules` | `rule_id` | `CapacityRule` | Admission rules |
//! | `offering_rules` | `(offering_id, rule_id)` | `()` | Rule lookup |
//! | `rule_orders` | `(rule_id, order_id)` | `()` | Seat counting |
//! | `invoices` | `reference` | `Invoice` | Invoice tree nodes |
//! | `invoice_children` | `(parent_ref, child_ref)` | `()` | Subtree scans |
//! | `order_root_invoice` | `order_id` | `reference` | One root per order |
//! | `transactions` | `reference` | `Transaction` | Settled payments |
//! | `invoice_transactions` | `(invoice_ref, txn_ref)` | `()` | Balance scans |
//! | `quote_counters` | `"PREFIX:YEAR"` | `u64` | Sequential references |
//! | `quote_refs` | `reference` | `()` | Residual-row guard |
//! | `processed_notifications` | `"installment:state"` | `()` | Webhook replay |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: once `commit()` returns the
//! write survives power loss, and the file is always in a consistent state.
//! Every write path here is a single transaction, so an order and its
//! indexes can never diverge.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::models::{CapacityRule, Invoice, Offering, Transaction};
use shared::order::Order;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Orders: key = order_id, value = JSON-serialized Order
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Installment lookup: key = installment_id, value = owning order_id
const INSTALLMENT_INDEX_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("installment_index");

/// Offerings: key = offering_id, value = JSON-serialized Offering
const OFFERINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("offerings");

/// Capacity rules: key = rule_id, value = JSON-serialized CapacityRule
const CAPACITY_RULES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("capacity_rules");

/// Rules per offering: key = (offering_id, rule_id), value = empty
const OFFERING_RULES_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("offering_rules");

/// Orders admitted under a rule: key = (rule_id, order_id), value = empty
const RULE_ORDERS_TABLE: TableDefinition<(&str, &str), ()> = TableDefinition::new("rule_orders");

/// Invoices: key = reference, value = JSON-serialized Invoice
const INVOICES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("invoices");

/// Credit notes per root: key = (parent_ref, child_ref), value = empty
const INVOICE_CHILDREN_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("invoice_children");

/// Root invoice per order: key = order_id, value = invoice reference
const ORDER_ROOT_INVOICE_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("order_root_invoice");

/// Transactions: key = reference, value = JSON-serialized Transaction
const TRANSACTIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Transactions per invoice: key = (invoice_ref, txn_ref), value = empty
const INVOICE_TRANSACTIONS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("invoice_transactions");

/// Sequential reference counters: key = "PREFIX:YEAR", value = highest issued
const QUOTE_COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("quote_counters");

/// Every sequential reference ever issued: key = reference, value = empty.
/// Rows here outlive the referencing entity; the sequencer re-checks this
/// table before handing a number out.
const QUOTE_REFS_TABLE: TableDefinition<&str, ()> = TableDefinition::new("quote_refs");

/// Handled webhook notifications: key = "installment_id:state", value = empty
const PROCESSED_NOTIFICATIONS_TABLE: TableDefinition<&str, ()> =
    TableDefinition::new("processed_notifications");

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Ledger storage backed by redb
#[derive(Clone)]
pub struct LedgerStorage {
    db: Arc<Database>,
}

impl LedgerStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let storage = Self { db: Arc::new(db) };
        storage.init_tables()?;
        Ok(storage)
    }

    /// Create all tables up front so read transactions never miss one
    fn init_tables(&self) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(INSTALLMENT_INDEX_TABLE)?;
            let _ = write_txn.open_table(OFFERINGS_TABLE)?;
            let _ = write_txn.open_table(CAPACITY_RULES_TABLE)?;
            let _ = write_txn.open_table(OFFERING_RULES_TABLE)?;
            let _ = write_txn.open_table(RULE_ORDERS_TABLE)?;
            let _ = write_txn.open_table(INVOICES_TABLE)?;
            let _ = write_txn.open_table(INVOICE_CHILDREN_TABLE)?;
            let _ = write_txn.open_table(ORDER_ROOT_INVOICE_TABLE)?;
            let _ = write_txn.open_table(TRANSACTIONS_TABLE)?;
            let _ = write_txn.open_table(INVOICE_TRANSACTIONS_TABLE)?;
            let _ = write_txn.open_table(QUOTE_COUNTERS_TABLE)?;
            let _ = write_txn.open_table(QUOTE_REFS_TABLE)?;
            let _ = write_txn.open_table(PROCESSED_NOTIFICATIONS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Order Operations ==========

    /// Store an order and maintain its indexes (within transaction)
    ///
    /// Installment and rule index entries are insert-only: installments are
    /// never removed from a schedule and admissions are never revoked, so
    /// overwriting on every save keeps the indexes exact.
    pub fn put_order(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            let value = serde_json::to_vec(order)?;
            table.insert(order.id.as_str(), value.as_slice())?;
        }
        {
            let mut index = txn.open_table(INSTALLMENT_INDEX_TABLE)?;
            for installment in &order.payment_schedule {
                index.insert(installment.id.as_str(), order.id.as_str())?;
            }
        }
        {
            let mut index = txn.open_table(RULE_ORDERS_TABLE)?;
            for rule_id in &order.capacity_rule_ids {
                index.insert((rule_id.as_str(), order.id.as_str()), ())?;
            }
        }
        Ok(())
    }

    /// Store an order in its own transaction
    pub fn save_order(&self, order: &Order) -> StorageResult<()> {
        let txn = self.begin_write()?;
        self.put_order(&txn, order)?;
        txn.commit()?;
        Ok(())
    }

    /// Get an order by ID
    pub fn get_order(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an order by ID (within transaction)
    pub fn get_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve the order owning an installment (webhook dispatch)
    pub fn find_order_by_installment(
        &self,
        installment_id: &str,
    ) -> StorageResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(INSTALLMENT_INDEX_TABLE)?;
        let order_id = match index.get(installment_id)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let table = read_txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// All orders admitted under a rule (point-in-time, no lock)
    pub fn orders_for_rule(&self, rule_id: &str) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(RULE_ORDERS_TABLE)?;
        let orders_table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for entry in index.range((rule_id, "")..)? {
            let (key, _) = entry?;
            let (rid, order_id) = key.value();
            if rid != rule_id {
                break;
            }
            if let Some(value) = orders_table.get(order_id)? {
                orders.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(orders)
    }

    /// All orders placed on an offering (organization assignment counts)
    pub fn orders_for_offering(&self, offering_id: &str) -> StorageResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDERS_TABLE)?;

        let mut orders = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let order: Order = serde_json::from_slice(value.value())?;
            if order.offering_id == offering_id {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    // ========== Catalog Operations ==========

    /// Store or replace an offering
    pub fn put_offering(&self, offering: &Offering) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(OFFERINGS_TABLE)?;
            let value = serde_json::to_vec(offering)?;
            table.insert(offering.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get an offering by ID
    pub fn get_offering(&self, offering_id: &str) -> StorageResult<Option<Offering>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OFFERINGS_TABLE)?;
        match table.get(offering_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Store or replace a capacity rule and index it under its offering
    pub fn put_capacity_rule(&self, rule: &CapacityRule) -> StorageResult<()> {
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(CAPACITY_RULES_TABLE)?;
            let value = serde_json::to_vec(rule)?;
            table.insert(rule.id.as_str(), value.as_slice())?;
        }
        {
            let mut index = txn.open_table(OFFERING_RULES_TABLE)?;
            index.insert((rule.offering_id.as_str(), rule.id.as_str()), ())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// All rules attached to an offering, in storage order
    pub fn rules_for_offering(&self, offering_id: &str) -> StorageResult<Vec<CapacityRule>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(OFFERING_RULES_TABLE)?;
        let rules_table = read_txn.open_table(CAPACITY_RULES_TABLE)?;

        let mut rules = Vec::new();
        for entry in index.range((offering_id, "")..)? {
            let (key, _) = entry?;
            let (oid, rule_id) = key.value();
            if oid != offering_id {
                break;
            }
            if let Some(value) = rules_table.get(rule_id)? {
                rules.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(rules)
    }

    // ========== Invoice Operations ==========

    /// Store an invoice and maintain the tree indexes (within transaction)
    pub fn put_invoice(&self, txn: &WriteTransaction, invoice: &Invoice) -> StorageResult<()> {
        {
            let mut table = txn.open_table(INVOICES_TABLE)?;
            let value = serde_json::to_vec(invoice)?;
            table.insert(invoice.reference.as_str(), value.as_slice())?;
        }
        match &invoice.parent {
            Some(parent) => {
                let mut index = txn.open_table(INVOICE_CHILDREN_TABLE)?;
                index.insert((parent.as_str(), invoice.reference.as_str()), ())?;
            }
            None => {
                let mut index = txn.open_table(ORDER_ROOT_INVOICE_TABLE)?;
                index.insert(invoice.order_id.as_str(), invoice.reference.as_str())?;
            }
        }
        Ok(())
    }

    /// Get an invoice by reference
    pub fn get_invoice(&self, reference: &str) -> StorageResult<Option<Invoice>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(INVOICES_TABLE)?;
        match table.get(reference)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Get an invoice by reference (within transaction)
    pub fn get_invoice_txn(
        &self,
        txn: &WriteTransaction,
        reference: &str,
    ) -> StorageResult<Option<Invoice>> {
        let table = txn.open_table(INVOICES_TABLE)?;
        match table.get(reference)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Root invoice reference for an order, if one was materialized
    pub fn root_invoice_for_order(&self, order_id: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ORDER_ROOT_INVOICE_TABLE)?;
        Ok(table.get(order_id)?.map(|v| v.value().to_string()))
    }

    /// Root invoice reference for an order (within transaction)
    pub fn root_invoice_for_order_txn(
        &self,
        txn: &WriteTransaction,
        order_id: &str,
    ) -> StorageResult<Option<String>> {
        let table = txn.open_table(ORDER_ROOT_INVOICE_TABLE)?;
        Ok(table.get(order_id)?.map(|v| v.value().to_string()))
    }

    /// Child invoices (credit notes) of a root, in reference order
    pub fn children_of(&self, reference: &str) -> StorageResult<Vec<Invoice>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(INVOICE_CHILDREN_TABLE)?;
        let invoices_table = read_txn.open_table(INVOICES_TABLE)?;

        let mut children = Vec::new();
        for entry in index.range((reference, "")..)? {
            let (key, _) = entry?;
            let (parent, child) = key.value();
            if parent != reference {
                break;
            }
            if let Some(value) = invoices_table.get(child)? {
                children.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(children)
    }

    /// Child invoices of a root (within transaction)
    pub fn children_of_txn(
        &self,
        txn: &WriteTransaction,
        reference: &str,
    ) -> StorageResult<Vec<Invoice>> {
        let index = txn.open_table(INVOICE_CHILDREN_TABLE)?;
        let invoices_table = txn.open_table(INVOICES_TABLE)?;

        let mut children = Vec::new();
        for entry in index.range((reference, "")..)? {
            let (key, _) = entry?;
            let (parent, child) = key.value();
            if parent != reference {
                break;
            }
            if let Some(value) = invoices_table.get(child)? {
                children.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(children)
    }

    /// Store a transaction against an invoice (within transaction)
    pub fn put_transaction(
        &self,
        txn: &WriteTransaction,
        transaction: &Transaction,
    ) -> StorageResult<()> {
        {
            let mut table = txn.open_table(TRANSACTIONS_TABLE)?;
            let value = serde_json::to_vec(transaction)?;
            table.insert(transaction.reference.as_str(), value.as_slice())?;
        }
        {
            let mut index = txn.open_table(INVOICE_TRANSACTIONS_TABLE)?;
            index.insert(
                (
                    transaction.invoice_reference.as_str(),
                    transaction.reference.as_str(),
                ),
                (),
            )?;
        }
        Ok(())
    }

    /// Settled transactions attached to one invoice
    pub fn transactions_for_invoice(&self, reference: &str) -> StorageResult<Vec<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(INVOICE_TRANSACTIONS_TABLE)?;
        let txns_table = read_txn.open_table(TRANSACTIONS_TABLE)?;

        let mut transactions = Vec::new();
        for entry in index.range((reference, "")..)? {
            let (key, _) = entry?;
            let (invoice_ref, txn_ref) = key.value();
            if invoice_ref != reference {
                break;
            }
            if let Some(value) = txns_table.get(txn_ref)? {
                transactions.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(transactions)
    }

    /// Settled transactions attached to one invoice (within transaction)
    pub fn transactions_for_invoice_txn(
        &self,
        txn: &WriteTransaction,
        reference: &str,
    ) -> StorageResult<Vec<Transaction>> {
        let index = txn.open_table(INVOICE_TRANSACTIONS_TABLE)?;
        let txns_table = txn.open_table(TRANSACTIONS_TABLE)?;

        let mut transactions = Vec::new();
        for entry in index.range((reference, "")..)? {
            let (key, _) = entry?;
            let (invoice_ref, txn_ref) = key.value();
            if invoice_ref != reference {
                break;
            }
            if let Some(value) = txns_table.get(txn_ref)? {
                transactions.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(transactions)
    }

    // ========== Sequential Reference Counters ==========

    /// Highest number issued so far for a "PREFIX:YEAR" scope
    pub fn quote_counter(&self, txn: &WriteTransaction, scope: &str) -> StorageResult<u64> {
        let table = txn.open_table(QUOTE_COUNTERS_TABLE)?;
        Ok(table.get(scope)?.map(|g| g.value()).unwrap_or(0))
    }

    /// Persist the counter for a scope (within the same critical section)
    pub fn set_quote_counter(
        &self,
        txn: &WriteTransaction,
        scope: &str,
        value: u64,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(QUOTE_COUNTERS_TABLE)?;
        table.insert(scope, value)?;
        Ok(())
    }

    /// Whether a formatted sequential reference was ever issued
    pub fn quote_ref_exists(&self, txn: &WriteTransaction, reference: &str) -> StorageResult<bool> {
        let table = txn.open_table(QUOTE_REFS_TABLE)?;
        Ok(table.get(reference)?.is_some())
    }

    /// Record an issued sequential reference
    pub fn insert_quote_ref(&self, txn: &WriteTransaction, reference: &str) -> StorageResult<()> {
        let mut table = txn.open_table(QUOTE_REFS_TABLE)?;
        table.insert(reference, ())?;
        Ok(())
    }

    // ========== Webhook Replay Protection ==========

    /// Check whether a notification was already handled (within transaction)
    pub fn is_notification_processed_txn(
        &self,
        txn: &WriteTransaction,
        key: &str,
    ) -> StorageResult<bool> {
        let table = txn.open_table(PROCESSED_NOTIFICATIONS_TABLE)?;
        Ok(table.get(key)?.is_some())
    }

    /// Mark a notification as handled
    pub fn mark_notification_processed(
        &self,
        txn: &WriteTransaction,
        key: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(PROCESSED_NOTIFICATIONS_TABLE)?;
        table.insert(key, ())?;
        Ok(())
    }
}
