//! Shared types for the order write path

use super::state::OrderState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Installments
// ============================================================================

/// 分期状态
///
/// Transitions are monotonic: PENDING→PAID→REFUNDED, or PENDING→CANCELED.
/// Nothing else is legal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentState {
    /// 待支付
    #[default]
    Pending,
    /// 已支付
    Paid,
    /// 已退款
    Refunded,
    /// 已取消 - 从未支付
    Canceled,
}

impl std::fmt::Display for InstallmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstallmentState::Pending => "PENDING",
            InstallmentState::Paid => "PAID",
            InstallmentState::Refunded => "REFUNDED",
            InstallmentState::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// One scheduled partial payment of an order's total
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Installment {
    /// Installment ID (UUID, referenced by webhook notifications)
    pub id: String,
    /// Amount in `currency`
    pub amount: Decimal,
    /// Currency code (ISO 4217)
    pub currency: String,
    /// Due date, offset from the schedule freeze date
    pub due_date: chrono::NaiveDate,
    /// Lifecycle state
    pub state: InstallmentState,
    /// Payment-backend reference, recorded when the installment is paid
    /// and required later to refund it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}

impl Installment {
    pub fn new(amount: Decimal, currency: impl Into<String>, due_date: chrono::NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            currency: currency.into(),
            due_date,
            state: InstallmentState::Pending,
            payment_reference: None,
        }
    }
}

// ============================================================================
// Order
// ============================================================================

/// Order entity
///
/// The money fields are `Decimal` and every amount in `payment_schedule`
/// sums to `total` exactly, to the cent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Order ID (UUID)
    pub id: String,
    /// State machine position
    pub state: OrderState,
    /// Owner user ID
    pub owner: String,
    /// Course+product pairing the order was placed on
    pub offering_id: String,
    /// Organization assigned at admission (fewest binding orders wins)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Frozen total price
    pub total: Decimal,
    /// Currency code (ISO 4217)
    pub currency: String,
    /// Ordered installments, materialized at submission
    #[serde(default)]
    pub payment_schedule: Vec<Installment>,
    /// Stored payment method reference; detached after a refund
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_card_id: Option<String>,
    /// Billing address frozen at submission, forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<BillingAddress>,
    /// Root invoice reference, materialized at submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_invoice: Option<String>,
    /// Capacity rules the order was admitted under
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capacity_rule_ids: Vec<String>,
    /// Voucher code handed in at creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher: Option<String>,
    /// Seats requested against capacity (batch orders may take several)
    pub seats: u32,
    /// Seat reserved for a later owner (routes to TO_OWN at submission)
    #[serde(default)]
    pub reserved: bool,
    /// Training contract signed by the owner
    #[serde(default)]
    pub contract_signed: bool,
    /// Creation timestamp (Unix millis)
    pub created_at: i64,
    /// Last update timestamp (Unix millis)
    pub updated_at: i64,
}

impl Order {
    /// Create a new draft order. Schedule, invoice and organization are
    /// filled in by the admission and submission paths.
    pub fn new(
        owner: impl Into<String>,
        offering_id: impl Into<String>,
        total: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        let now = crate::util::now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: OrderState::Draft,
            owner: owner.into(),
            offering_id: offering_id.into(),
            organization_id: None,
            total,
            currency: currency.into(),
            payment_schedule: Vec::new(),
            credit_card_id: None,
            billing_address: None,
            main_invoice: None,
            capacity_rule_ids: Vec::new(),
            voucher: None,
            seats: 1,
            reserved: false,
            contract_signed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn find_installment(&self, installment_id: &str) -> Option<&Installment> {
        self.payment_schedule.iter().find(|i| i.id == installment_id)
    }

    pub fn find_installment_mut(&mut self, installment_id: &str) -> Option<&mut Installment> {
        self.payment_schedule
            .iter_mut()
            .find(|i| i.id == installment_id)
    }

    /// At least one installment has been captured
    pub fn has_paid_installment(&self) -> bool {
        self.payment_schedule
            .iter()
            .any(|i| i.state == InstallmentState::Paid)
    }

    /// Every installment of a non-empty schedule is paid
    pub fn is_fully_paid(&self) -> bool {
        !self.payment_schedule.is_empty()
            && self
                .payment_schedule
                .iter()
                .all(|i| i.state == InstallmentState::Paid)
    }

    /// Sum of captured installment amounts
    pub fn paid_total(&self) -> Decimal {
        self.payment_schedule
            .iter()
            .filter(|i| i.state == InstallmentState::Paid)
            .map(|i| i.amount)
            .sum()
    }

    pub fn touch(&mut self) {
        self.updated_at = crate::util::now_millis();
    }
}

// ============================================================================
// Request payloads
// ============================================================================

/// Create order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreate {
    pub owner: String,
    pub offering_id: String,
    /// Seats requested (defaults to 1)
    pub seats: Option<u32>,
    /// Pre-registered payment method, if the buyer already has one
    pub credit_card_id: Option<String>,
    pub voucher: Option<String>,
    /// Reserve the seat for a later owner instead of enrolling now
    pub reserved: Option<bool>,
}

/// Submit order payload (freezes the price)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrderSubmit {
    pub billing_address: Option<BillingAddress>,
}

/// Billing address forwarded to the payment backend
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BillingAddress {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub postcode: String,
    pub country: String,
}

/// Attach payment method payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodAttach {
    pub credit_card_id: String,
}

/// Claim a reserved seat payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderClaim {
    /// The eventual owner taking the seat
    pub owner: String,
}

// ============================================================================
// Payment-backend notifications (webhook)
// ============================================================================

/// Installment state carried by a webhook notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    Paid,
    Refunded,
    Canceled,
}

impl std::fmt::Display for NotificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationState::Paid => "paid",
            NotificationState::Refunded => "refunded",
            NotificationState::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Webhook body posted by the payment backend
///
/// Handling must be idempotent per (installment_id, state) pair: providers
/// redeliver aggressively and a replay must not double-trigger side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// Payment reference at the backend
    pub id: String,
    /// Notification family; only "payment" is handled
    #[serde(rename = "type")]
    pub kind: String,
    /// Target installment state
    pub state: NotificationState,
    /// Installment the notification applies to
    pub installment_id: String,
}

/// Webhook acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAck {
    /// False when the notification was a replay and was skipped
    pub processed: bool,
}

// ============================================================================
// Refund reporting
// ============================================================================

/// One installment the refund pass could not process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundFailure {
    pub installment_id: String,
    pub error: String,
}

/// Outcome of a refund pass over an order
///
/// Failures are isolated per installment: entries in `refunded` were
/// committed even when `failures` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReport {
    pub order_id: String,
    /// Installments whose captured payment was reversed
    pub refunded: Vec<Installment>,
    /// Pending installments closed without ever being captured
    pub canceled: Vec<Installment>,
    /// Backend failures after retry exhaustion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RefundFailure>,
    /// Sum of refunded amounts
    pub total_refunded: Decimal,
}
