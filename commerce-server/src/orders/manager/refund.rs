//! Refund pass over a canceled order
//!
//! Every installment refunds independently: one backend failure is logged,
//! reported, and skipped over, never rolling back refunds already
//! committed. There is deliberately no transaction spanning the whole pass.

use shared::order::{
    Installment, InstallmentState, OrderState, OrderTransition, RefundFailure, RefundReport,
};
use tracing::{info, warn};

use super::{ManagerError, ManagerResult, OrdersManager};
use crate::orders::installments;
use crate::payment::with_retry;

impl OrdersManager {
    /// Refund the captured installments of a canceled order.
    ///
    /// Preconditions: the order is CANCELED and at least one installment is
    /// paid. The order moves to REFUNDING for the duration of the pass and
    /// reaches REFUNDED when at least one installment came back; its stored
    /// payment method is detached at that point. Exactly one aggregate
    /// notification is sent, whatever the mix of outcomes.
    pub async fn refund_order(&self, order_id: &str) -> ManagerResult<RefundReport> {
        let mut order = self.load(order_id)?;
        if order.state != OrderState::Canceled {
            return Err(ManagerError::InvalidOperation(format!(
                "order {} must be canceled before refund, is {}",
                order.id, order.state
            )));
        }
        if !order.has_paid_installment() {
            return Err(ManagerError::InvalidOperation(format!(
                "order {} has no paid installment to refund",
                order.id
            )));
        }

        order.state = order.state.apply(OrderTransition::StartRefund)?;
        order.touch();
        self.storage.save_order(&order)?;

        let report = self.run_refund(&mut order).await?;

        if !report.refunded.is_empty() {
            order.state = order.state.apply(OrderTransition::CompleteRefund)?;
            // 退款完成,解除绑定的支付方式
            order.credit_card_id = None;
        }
        order.touch();
        self.storage.save_order(&order)?;

        self.notifier.order_refunded(&order, &report).await;
        info!(
            order_id = %order.id,
            refunded = report.refunded.len(),
            canceled = report.canceled.len(),
            failures = report.failures.len(),
            total_refunded = %report.total_refunded,
            state = %order.state,
            "refund pass finished"
        );
        Ok(report)
    }

    /// Walk the schedule in order: reverse every paid installment, then
    /// close every remaining pending one.
    async fn run_refund(&self, order: &mut shared::order::Order) -> ManagerResult<RefundReport> {
        let root = order.main_invoice.clone().ok_or_else(|| {
            ManagerError::InvalidOperation(format!("order {} has no root invoice", order.id))
        })?;

        let mut refunded: Vec<Installment> = Vec::new();
        let mut failures: Vec<RefundFailure> = Vec::new();

        let paid: Vec<Installment> = order
            .payment_schedule
            .iter()
            .filter(|i| i.state == InstallmentState::Paid)
            .cloned()
            .collect();

        for installment in &paid {
            let Some(reference) = installment.payment_reference.clone() else {
                warn!(
                    order_id = %order.id,
                    installment_id = %installment.id,
                    "paid installment has no payment reference, skipping"
                );
                failures.push(RefundFailure {
                    installment_id: installment.id.clone(),
                    error: "no payment reference recorded".to_string(),
                });
                continue;
            };

            let result = with_retry("refund", self.retry_base_delay, || {
                self.payment
                    .refund(&reference, installment.amount, &installment.currency)
            })
            .await;

            match result {
                Ok(refund_id) => {
                    // 每笔退款独立提交
                    let txn = self.storage.begin_write()?;
                    let note = self
                        .invoices
                        .create_credit_note(&txn, &root, installment.amount)?;
                    self.invoices.record_transaction(
                        &txn,
                        &note.reference,
                        &refund_id,
                        -installment.amount,
                    )?;
                    installments::mark_refunded(order, &installment.id)?;
                    order.touch();
                    self.storage.put_order(&txn, order)?;
                    txn.commit()?;

                    if let Some(updated) = order.find_installment(&installment.id) {
                        refunded.push(updated.clone());
                    }
                }
                Err(err) => {
                    warn!(
                        order_id = %order.id,
                        installment_id = %installment.id,
                        error = %err,
                        "refund failed, continuing with remaining installments"
                    );
                    failures.push(RefundFailure {
                        installment_id: installment.id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        // 剩余未支付的分期全部关闭
        let pending_ids: Vec<String> = order
            .payment_schedule
            .iter()
            .filter(|i| i.state == InstallmentState::Pending)
            .map(|i| i.id.clone())
            .collect();
        let mut canceled: Vec<Installment> = Vec::new();
        if !pending_ids.is_empty() {
            for id in &pending_ids {
                installments::mark_canceled(order, id)?;
                if let Some(updated) = order.find_installment(id) {
                    canceled.push(updated.clone());
                }
            }
            order.touch();
            self.storage.save_order(order)?;
        }

        let total_refunded = refunded.iter().map(|i| i.amount).sum();
        Ok(RefundReport {
            order_id: order.id.clone(),
            refunded,
            canceled,
            failures,
            total_refunded,
        })
    }
}
