use super::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::order::{BillingAddress, Installment, RefundReport};

use crate::payment::{CreatedPayment, PaymentError};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn create_test_manager() -> OrdersManager {
    let storage = LedgerStorage::open_in_memory().unwrap();
    let mut manager = OrdersManager::with_storage(storage);
    // 测试不等真实退避
    manager.retry_base_delay = Duration::from_millis(1);
    manager
}

// ========================================================================
// Helper: seed catalog entities
// ========================================================================

fn seed_offering(manager: &OrdersManager, id: &str, price: &str) -> Offering {
    manager
        .upsert_offering(Offering::new(id, "DEMO-101", "prod-1", "Demo Course", dec(price)))
        .unwrap()
}

/// Create payload with a stored card and all defaults
fn order_create(offering_id: &str) -> OrderCreate {
    OrderCreate {
        owner: "user-1".to_string(),
        offering_id: offering_id.to_string(),
        seats: None,
        credit_card_id: Some("card-1".to_string()),
        voucher: None,
        reserved: None,
    }
}

/// 创建并提交订单 (带卡, 落在 PENDING)
fn submitted_order(manager: &OrdersManager, offering_id: &str) -> Order {
    let order = manager.create_order(order_create(offering_id)).unwrap();
    manager.submit_order(&order.id, OrderSubmit::default()).unwrap()
}

// ========================================================================
// Helper: webhook delivery
// ========================================================================

/// Deliver a paid webhook for the n-th installment (0-based)
async fn pay_installment(
    manager: &OrdersManager,
    order_id: &str,
    index: usize,
    payment_id: &str,
) -> NotificationAck {
    let order = manager.get_order(order_id).unwrap();
    let installment_id = order.payment_schedule[index].id.clone();
    manager
        .handle_notification(PaymentNotification {
            id: payment_id.to_string(),
            kind: "payment".to_string(),
            state: NotificationState::Paid,
            installment_id,
        })
        .await
        .unwrap()
}

// ========================================================================
// Helper: assertions
// ========================================================================

fn assert_order_state(manager: &OrdersManager, order_id: &str, expected: OrderState) {
    let order = manager.get_order(order_id).unwrap();
    assert_eq!(
        order.state, expected,
        "Expected order state {}, got {}",
        expected, order.state
    );
}

fn assert_installment_states(order: &Order, expected: &[InstallmentState]) {
    let got: Vec<InstallmentState> = order.payment_schedule.iter().map(|i| i.state).collect();
    assert_eq!(got, expected, "installment states diverged for {}", order.id);
}

// ========================================================================
// 测试替身: 通知与支付后端
// ========================================================================

/// Notifier double capturing every outbound notification
#[derive(Default)]
struct RecordingNotifier {
    paid: Mutex<Vec<(String, Decimal)>>,
    refund_reports: Mutex<Vec<RefundReport>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn installment_paid(&self, order: &Order, installment: &Installment) {
        self.paid.lock().push((order.id.clone(), installment.amount));
    }

    async fn order_refunded(&self, _order: &Order, report: &RefundReport) {
        self.refund_reports.lock().push(report.clone());
    }
}

/// Payment backend double rejecting refunds for scripted references
struct ScriptedBackend {
    reject: Vec<String>,
    refund_calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn rejecting(references: &[&str]) -> Self {
        Self {
            reject: references.iter().map(|s| s.to_string()).collect(),
            refund_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentBackend for ScriptedBackend {
    async fn create_payment(
        &self,
        _order: &Order,
        installment: &Installment,
        _billing_address: Option<&BillingAddress>,
    ) -> Result<CreatedPayment, PaymentError> {
        Ok(CreatedPayment {
            payment_id: format!("scripted-{}", installment.id),
        })
    }

    async fn refund(
        &self,
        payment_reference: &str,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<String, PaymentError> {
        self.refund_calls.lock().push(payment_reference.to_string());
        if self.reject.iter().any(|r| r == payment_reference) {
            return Err(PaymentError::Permanent("insufficient balance".to_string()));
        }
        Ok(format!("ref-{payment_reference}"))
    }
}

mod test_capacity;
