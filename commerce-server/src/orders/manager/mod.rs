//! OrdersManager - Order admission, payment progress and refund driving
//!
//! This module handles:
//! - Order creation against capacity rules (admission, discount, organization)
//! - Submission: price freeze, installment schedule, root invoice
//! - Payment-backend webhook dispatch into the installment ledger
//! - Cancellation and the refund pass
//!
//! # Write path
//!
//! ```text
//! operation(order_id, payload)
//!     ├─ 1. Load the order
//!     ├─ 2. Validate (state machine / ledgers, pure checks)
//!     ├─ 3. Apply the change in memory
//!     ├─ 4. Begin write transaction, persist order + indexes
//!     ├─ 5. Commit
//!     └─ 6. Emit notifications (only after commit)
//! ```
//!
//! Webhook handling additionally records a replay marker inside the same
//! transaction, making step 3 idempotent per (installment, state) pair.

mod error;
mod refund;
pub use error::*;

use rust_decimal::Decimal;
use shared::models::{CapacityRule, InvoiceBalances, Offering};
use shared::order::{
    InstallmentState, NotificationAck, NotificationState, Order, OrderClaim, OrderCreate,
    OrderState, OrderSubmit, OrderTransition, PaymentMethodAttach, PaymentNotification,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::capacity::CapacityAllocator;
use crate::invoicing::{InvoiceLedger, ReferenceSequencer};
use crate::notify::{Notifier, TracingNotifier};
use crate::orders::installments::{self, LedgerOutcome};
use crate::orders::money::{percent_of, round_cents};
use crate::orders::schedule::{PaymentScheduleBuilder, ScheduleTiers};
use crate::payment::{DummyPaymentBackend, PaymentBackend, with_retry};
use crate::storage::LedgerStorage;

/// Base delay between payment-backend retries
const RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// Orders manager wiring the ledgers, the allocator and the backend seams
pub struct OrdersManager {
    storage: LedgerStorage,
    schedule_builder: PaymentScheduleBuilder,
    invoices: InvoiceLedger,
    capacity: CapacityAllocator,
    sequencer: ReferenceSequencer,
    payment: Arc<dyn PaymentBackend>,
    notifier: Arc<dyn Notifier>,
    /// Default settlement currency for new orders
    currency: String,
    retry_base_delay: Duration,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("storage", &"<LedgerStorage>")
            .field("currency", &self.currency)
            .finish()
    }
}

impl OrdersManager {
    /// Create a new OrdersManager with the given database path
    pub fn new(
        db_path: impl AsRef<Path>,
        currency: &str,
        tiers: ScheduleTiers,
    ) -> ManagerResult<Self> {
        let storage = LedgerStorage::open(db_path)?;
        Ok(Self::assemble(storage, currency, tiers))
    }

    /// Create an OrdersManager with existing storage (for testing)
    #[cfg(test)]
    pub fn with_storage(storage: LedgerStorage) -> Self {
        Self::assemble(storage, "EUR", ScheduleTiers::standard())
    }

    fn assemble(storage: LedgerStorage, currency: &str, tiers: ScheduleTiers) -> Self {
        Self {
            schedule_builder: PaymentScheduleBuilder::new(tiers),
            invoices: InvoiceLedger::new(storage.clone()),
            capacity: CapacityAllocator::new(storage.clone()),
            sequencer: ReferenceSequencer::new(storage.clone()),
            payment: Arc::new(DummyPaymentBackend),
            notifier: Arc::new(TracingNotifier),
            currency: currency.to_string(),
            retry_base_delay: RETRY_BASE_DELAY,
            storage,
        }
    }

    /// Swap in a real payment backend (dummy by default)
    pub fn set_payment_backend(&mut self, backend: Arc<dyn PaymentBackend>) {
        self.payment = backend;
    }

    /// Swap in a real notification sink (tracing by default)
    pub fn set_notifier(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifier = notifier;
    }

    /// Get the underlying storage
    pub fn storage(&self) -> &LedgerStorage {
        &self.storage
    }

    /// Next sequential quote reference (`PREFIX_YYYY_0000001`)
    pub fn next_quote_reference(&self, prefix: &str) -> ManagerResult<String> {
        Ok(self.sequencer.quote_reference(prefix)?)
    }

    // ========== Catalog入口 ==========

    /// Store or replace an offering
    pub fn upsert_offering(&self, offering: Offering) -> ManagerResult<Offering> {
        self.storage.put_offering(&offering)?;
        Ok(offering)
    }

    /// Store or replace a capacity rule
    pub fn upsert_capacity_rule(&self, rule: CapacityRule) -> ManagerResult<CapacityRule> {
        self.storage.put_capacity_rule(&rule)?;
        Ok(rule)
    }

    // ========== Order Operations ==========

    pub fn get_order(&self, order_id: &str) -> ManagerResult<Order> {
        self.load(order_id)
    }

    /// Create a draft order on an offering.
    ///
    /// Runs capacity admission and organization assignment here; the seat is
    /// only *counted* once the order reaches a binding state, so concurrent
    /// creations can race past the budget (point-in-time check, no lock).
    pub fn create_order(&self, payload: OrderCreate) -> ManagerResult<Order> {
        let seats = payload.seats.unwrap_or(1);
        if seats == 0 {
            return Err(ManagerError::InvalidOperation(
                "seats must be at least 1".to_string(),
            ));
        }
        let offering = self
            .storage
            .get_offering(&payload.offering_id)?
            .ok_or_else(|| ManagerError::OfferingNotFound(payload.offering_id.clone()))?;

        let admitted = self.capacity.admit(&offering.id, seats)?;
        let organization_id = self.capacity.assign_organization(&offering)?;

        let mut total = offering.price * Decimal::from(seats);
        if let Some(discount) = admitted.as_ref().and_then(|rule| rule.discount_percent) {
            total -= percent_of(total, discount);
        }
        let total = round_cents(total);

        let mut order = Order::new(payload.owner, offering.id.clone(), total, &self.currency);
        order.seats = seats;
        order.credit_card_id = payload.credit_card_id;
        order.voucher = payload.voucher;
        order.reserved = payload.reserved.unwrap_or(false);
        order.organization_id = organization_id;
        if let Some(rule) = admitted {
            order.capacity_rule_ids.push(rule.id);
        }

        self.storage.save_order(&order)?;
        info!(
            order_id = %order.id,
            offering_id = %order.offering_id,
            total = %order.total,
            seats,
            organization = ?order.organization_id,
            "order created"
        );
        Ok(order)
    }

    /// Submit a draft order: freeze the price, build the installment
    /// schedule, materialize the root invoice and route to the next state.
    pub fn submit_order(&self, order_id: &str, payload: OrderSubmit) -> ManagerResult<Order> {
        let mut order = self.load(order_id)?;
        let offering = self
            .storage
            .get_offering(&order.offering_id)?
            .ok_or_else(|| ManagerError::OfferingNotFound(order.offering_id.clone()))?;

        order.state = order.state.apply(OrderTransition::Submit)?;

        order.payment_schedule =
            self.schedule_builder
                .build(order.total, &order.currency, shared::util::today())?;
        order.billing_address = payload.billing_address;
        Self::validate_schedule(&order)?;

        // 按缺失的前置条件路由: 合同 > 预留 > 支付方式
        let routing = if offering.requires_contract && !order.contract_signed {
            OrderTransition::RequireSignature
        } else if order.reserved {
            OrderTransition::Reserve
        } else if order.credit_card_id.is_none() {
            OrderTransition::RequirePaymentMethod
        } else {
            OrderTransition::Ready
        };
        order.state = order.state.apply(routing)?;
        order.touch();

        let txn = self.storage.begin_write()?;
        let invoice = self.invoices.create_root(&txn, &order)?;
        order.main_invoice = Some(invoice.reference.clone());
        self.storage.put_order(&txn, &order)?;
        txn.commit()?;

        info!(
            order_id = %order.id,
            invoice = %invoice.reference,
            installments = order.payment_schedule.len(),
            state = %order.state,
            "order submitted"
        );
        Ok(order)
    }

    /// Attach a stored payment method; advances the order when it was
    /// waiting on exactly that.
    pub fn attach_payment_method(
        &self,
        order_id: &str,
        payload: PaymentMethodAttach,
    ) -> ManagerResult<Order> {
        let mut order = self.load(order_id)?;
        if order.state.is_terminal() || order.state == OrderState::Refunding {
            return Err(ManagerError::InvalidOperation(format!(
                "order {} is closed ({})",
                order.id, order.state
            )));
        }
        order.credit_card_id = Some(payload.credit_card_id);
        if order.state == OrderState::ToSavePaymentMethod {
            order.state = order.state.apply(OrderTransition::Ready)?;
        }
        order.touch();
        self.storage.save_order(&order)?;
        Ok(order)
    }

    /// Record the training contract signature; advances the order when it
    /// was waiting on it.
    pub fn sign_contract(&self, order_id: &str) -> ManagerResult<Order> {
        let mut order = self.load(order_id)?;
        if order.state.is_terminal() || order.state == OrderState::Refunding {
            return Err(ManagerError::InvalidOperation(format!(
                "order {} is closed ({})",
                order.id, order.state
            )));
        }
        order.contract_signed = true;
        if order.state == OrderState::ToSign {
            let routing = if order.reserved {
                OrderTransition::Reserve
            } else if order.credit_card_id.is_none() {
                OrderTransition::RequirePaymentMethod
            } else {
                OrderTransition::Ready
            };
            order.state = order.state.apply(routing)?;
        }
        order.touch();
        self.storage.save_order(&order)?;
        Ok(order)
    }

    /// A reserved seat is taken over by its eventual owner
    pub fn claim_order(&self, order_id: &str, payload: OrderClaim) -> ManagerResult<Order> {
        let mut order = self.load(order_id)?;
        order.state = order.state.apply(OrderTransition::Claim)?;
        order.owner = payload.owner;
        order.touch();
        self.storage.save_order(&order)?;
        info!(order_id = %order.id, owner = %order.owner, "reserved seat claimed");
        Ok(order)
    }

    /// Register the next pending installment with the payment backend.
    ///
    /// The capture itself comes back asynchronously through the webhook;
    /// this only records the backend payment reference.
    pub async fn initiate_payment(&self, order_id: &str) -> ManagerResult<Order> {
        let mut order = self.load(order_id)?;
        if !matches!(
            order.state,
            OrderState::Pending | OrderState::PendingPayment | OrderState::Validated
        ) {
            return Err(ManagerError::InvalidOperation(format!(
                "order {} is not payable in state {}",
                order.id, order.state
            )));
        }
        let Some(installment) = order
            .payment_schedule
            .iter()
            .find(|i| i.state == InstallmentState::Pending)
            .cloned()
        else {
            return Err(ManagerError::InvalidOperation(format!(
                "order {} has no pending installment",
                order.id
            )));
        };

        let created = with_retry("create_payment", self.retry_base_delay, || {
            self.payment
                .create_payment(&order, &installment, order.billing_address.as_ref())
        })
        .await?;

        if let Some(target) = order.find_installment_mut(&installment.id) {
            target.payment_reference = Some(created.payment_id.clone());
        }
        order.touch();
        self.storage.save_order(&order)?;
        info!(
            order_id = %order.id,
            installment_id = %installment.id,
            payment_id = %created.payment_id,
            "payment registered with backend"
        );
        Ok(order)
    }

    /// Dispatch a payment-backend webhook into the installment ledger.
    ///
    /// Idempotent per (installment, state): the replay marker commits in the
    /// same transaction as the ledger change, so a redelivery can never
    /// double-apply nor double-notify.
    pub async fn handle_notification(
        &self,
        payload: PaymentNotification,
    ) -> ManagerResult<NotificationAck> {
        if payload.kind != "payment" {
            return Err(ManagerError::InvalidOperation(format!(
                "unsupported notification type: {}",
                payload.kind
            )));
        }
        let order_id = self
            .storage
            .find_order_by_installment(&payload.installment_id)?
            .ok_or_else(|| ManagerError::InstallmentNotFound(payload.installment_id.clone()))?
            .id;

        let replay_key = format!("{}:{}", payload.installment_id, payload.state);
        let txn = self.storage.begin_write()?;
        if self.storage.is_notification_processed_txn(&txn, &replay_key)? {
            debug!(
                installment_id = %payload.installment_id,
                state = %payload.state,
                "duplicate notification dropped"
            );
            return Ok(NotificationAck { processed: false });
        }
        let mut order = self
            .storage
            .get_order_txn(&txn, &order_id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order_id.clone()))?;

        let outcome = match payload.state {
            NotificationState::Paid => {
                installments::mark_paid(&mut order, &payload.installment_id, Some(&payload.id))?
            }
            NotificationState::Refunded => {
                installments::mark_refunded(&mut order, &payload.installment_id)?
            }
            NotificationState::Canceled => {
                installments::mark_canceled(&mut order, &payload.installment_id)?
            }
        };

        let mut paid_installment = None;
        if matches!(outcome, LedgerOutcome::Applied { .. })
            && payload.state == NotificationState::Paid
        {
            order.state = order.state.apply(OrderTransition::InstallmentPaid)?;
            if order.is_fully_paid() {
                order.state = order.state.apply(OrderTransition::Settle)?;
            }

            let installment = order
                .find_installment(&payload.installment_id)
                .cloned()
                .ok_or_else(|| ManagerError::InstallmentNotFound(payload.installment_id.clone()))?;
            // 已结算的交易挂到根发票
            if let Some(root) = &order.main_invoice {
                self.invoices
                    .record_transaction(&txn, root, &payload.id, installment.amount)?;
            }
            paid_installment = Some(installment);
        }

        self.storage.mark_notification_processed(&txn, &replay_key)?;
        order.touch();
        self.storage.put_order(&txn, &order)?;
        txn.commit()?;

        let processed = matches!(outcome, LedgerOutcome::Applied { .. });
        if let Some(installment) = paid_installment {
            self.notifier.installment_paid(&order, &installment).await;
            info!(
                order_id = %order.id,
                installment_id = %installment.id,
                amount = %installment.amount,
                state = %order.state,
                "installment paid"
            );
        }
        Ok(NotificationAck { processed })
    }

    /// Cancel an order.
    ///
    /// Always lands in CANCELED; when captured payments exist, the refund
    /// pass is a separate, explicit operation.
    pub fn cancel_order(&self, order_id: &str) -> ManagerResult<Order> {
        let mut order = self.load(order_id)?;
        order.state = order.state.apply(OrderTransition::Cancel)?;
        order.touch();
        self.storage.save_order(&order)?;
        info!(
            order_id = %order.id,
            paid_total = %order.paid_total(),
            "order canceled"
        );
        Ok(order)
    }

    /// Balances of the order's root invoice subtree
    pub fn invoice_balances(&self, order_id: &str) -> ManagerResult<InvoiceBalances> {
        let order = self.load(order_id)?;
        let root = order.main_invoice.ok_or_else(|| {
            ManagerError::InvalidOperation(format!("order {order_id} has no invoice yet"))
        })?;
        Ok(self.invoices.balances(&root)?)
    }

    fn load(&self, order_id: &str) -> ManagerResult<Order> {
        self.storage
            .get_order(order_id)?
            .ok_or_else(|| ManagerError::OrderNotFound(order_id.to_string()))
    }

    /// Explicit pre-persist check: the schedule must sum back to the total
    fn validate_schedule(order: &Order) -> ManagerResult<()> {
        let sum: Decimal = order.payment_schedule.iter().map(|i| i.amount).sum();
        if sum != order.total {
            return Err(ManagerError::InvalidOperation(format!(
                "schedule sums to {sum}, order total is {}",
                order.total
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
