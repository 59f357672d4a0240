//! Installment lifecycle ledger
//!
//! Installment states only ever move forward: `pending → paid → refunded`,
//! or `pending → canceled`. Re-applying the current state is a no-op, which
//! is what makes duplicated payment-backend webhooks harmless. Each
//! `Applied` outcome is the caller's cue to emit exactly one notification;
//! a `Noop` must emit none.

use shared::order::{InstallmentState, Order};
use thiserror::Error;

/// Result of a ledger operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The installment changed state; one notification is owed
    Applied { previous: InstallmentState },
    /// The installment was already in the requested state
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("order {order_id} has no installment {installment_id}")]
    UnknownInstallment {
        order_id: String,
        installment_id: String,
    },

    #[error("installment {installment_id} cannot move from {from} to {to}")]
    IllegalTransition {
        installment_id: String,
        from: InstallmentState,
        to: InstallmentState,
    },
}

/// Mark an installment paid, recording the backend payment reference.
///
/// The reference is only written on the first (effective) call; a duplicate
/// webhook never overwrites what an earlier one recorded.
pub fn mark_paid(
    order: &mut Order,
    installment_id: &str,
    payment_reference: Option<&str>,
) -> Result<LedgerOutcome, LedgerError> {
    let outcome = transition(order, installment_id, InstallmentState::Paid)?;
    if let LedgerOutcome::Applied { .. } = outcome {
        if let (Some(reference), Some(installment)) =
            (payment_reference, order.find_installment_mut(installment_id))
        {
            installment.payment_reference = Some(reference.to_string());
        }
    }
    Ok(outcome)
}

/// Mark a paid installment refunded
pub fn mark_refunded(
    order: &mut Order,
    installment_id: &str,
) -> Result<LedgerOutcome, LedgerError> {
    transition(order, installment_id, InstallmentState::Refunded)
}

/// Mark a pending installment canceled
pub fn mark_canceled(
    order: &mut Order,
    installment_id: &str,
) -> Result<LedgerOutcome, LedgerError> {
    transition(order, installment_id, InstallmentState::Canceled)
}

fn transition(
    order: &mut Order,
    installment_id: &str,
    to: InstallmentState,
) -> Result<LedgerOutcome, LedgerError> {
    let order_id = order.id.clone();
    let installment = order.find_installment_mut(installment_id).ok_or_else(|| {
        LedgerError::UnknownInstallment {
            order_id,
            installment_id: installment_id.to_string(),
        }
    })?;

    let from = installment.state;
    if from == to {
        return Ok(LedgerOutcome::Noop);
    }
    if !is_legal(from, to) {
        return Err(LedgerError::IllegalTransition {
            installment_id: installment_id.to_string(),
            from,
            to,
        });
    }
    installment.state = to;
    Ok(LedgerOutcome::Applied { previous: from })
}

/// 单向推进: pending→paid→refunded / pending→canceled
fn is_legal(from: InstallmentState, to: InstallmentState) -> bool {
    matches!(
        (from, to),
        (InstallmentState::Pending, InstallmentState::Paid)
            | (InstallmentState::Paid, InstallmentState::Refunded)
            | (InstallmentState::Pending, InstallmentState::Canceled)
    )
}
