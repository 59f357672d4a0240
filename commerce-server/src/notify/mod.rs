//! Outbound notification seam
//!
//! Mails and push messages live outside this service; the engine only
//! promises *when* a notification fires: exactly once per effective
//! installment transition, and exactly one aggregate per refund run.

use async_trait::async_trait;
use shared::order::{Installment, Order, RefundReport};
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// One installment moved to paid
    async fn installment_paid(&self, order: &Order, installment: &Installment);

    /// A refund run finished; the report carries refunded vs canceled
    /// installments and the total refunded amount
    async fn order_refunded(&self, order: &Order, report: &RefundReport);
}

/// Default sink: structured log lines, picked up by the mail relay
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn installment_paid(&self, order: &Order, installment: &Installment) {
        info!(
            target: "notification",
            order_id = %order.id,
            owner = %order.owner,
            installment_id = %installment.id,
            amount = %installment.amount,
            currency = %installment.currency,
            "installment paid"
        );
    }

    async fn order_refunded(&self, order: &Order, report: &RefundReport) {
        info!(
            target: "notification",
            order_id = %order.id,
            owner = %order.owner,
            refunded = report.refunded.len(),
            canceled = report.canceled.len(),
            failures = report.failures.len(),
            total_refunded = %report.total_refunded,
            "order refunded"
        );
    }
}
