//! Order state machine
//!
//! The order lifecycle is an explicit transition table checked by a pure
//! function: `state.apply(transition)` either returns the next state or an
//! [`IllegalTransition`] carrying both sides, leaving the caller's state
//! untouched. No transition ever happens implicitly.
//!
//! ```text
//! DRAFT ──SUBMIT──> SUBMITTED ──READY──────────────> PENDING ──INSTALLMENT_PAID──> PENDING_PAYMENT
//!                      │  │                            │                              │        │
//!                      │  ├─REQUIRE_SIGNATURE─> TO_SIGN│                   INSTALLMENT_PAID    │
//!                      │  ├─REQUIRE_PAYMENT_METHOD─> TO_SAVE_PAYMENT_METHOD ──READY──┘       SETTLE
//!                      │  ├─RESERVE──> TO_OWN ──CLAIM──┘                                       │
//!                      │  └─VALIDATE─> VALIDATED ──SETTLE──────────────────────────> COMPLETED ┘
//!                      │
//! (any non-terminal) ──CANCEL──> CANCELED ──START_REFUND──> REFUNDING ──COMPLETE_REFUND──> REFUNDED
//! ```
//!
//! Terminal states: `COMPLETED`, `CANCELED` (no payment ever captured) and
//! `REFUNDED` (payment captured then reversed). The only exit from
//! `CANCELED` is the refund pass over captured installments.

use serde::{Deserialize, Serialize};

/// 订单状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// 草稿 - 未提交，价格未冻结
    #[default]
    Draft,
    /// 已提交 - 价格已冻结，等待路由到下一步
    Submitted,
    /// Awaiting the first installment debit
    Pending,
    /// At least one installment paid, others outstanding
    PendingPayment,
    /// Validated by an operator or zero-total, enrollment active
    Validated,
    /// Awaiting a stored payment method
    ToSavePaymentMethod,
    /// Awaiting the training contract signature
    ToSign,
    /// Seat reserved for a later owner (batch orders)
    ToOwn,
    /// 已完成 - 全部分期已支付
    Completed,
    /// 已取消 - 从未捕获任何付款，或等待退款启动
    Canceled,
    /// Refund pass in progress
    Refunding,
    /// Captured payments reversed
    Refunded,
}

/// 订单状态机事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderTransition {
    /// Freeze the price and leave `DRAFT`
    Submit,
    /// The product requires a signed contract first
    RequireSignature,
    /// A stored payment method is required first
    RequirePaymentMethod,
    /// All prerequisites met, wait for the first debit
    Ready,
    /// Park the seat for a later owner
    Reserve,
    /// A reserved seat is claimed by its eventual owner
    Claim,
    /// Operator validation / zero-total fast path
    Validate,
    /// A payment-backend notification marked an installment paid
    InstallmentPaid,
    /// Every installment reached `PAID`
    Settle,
    /// Cancel the order
    Cancel,
    /// Begin the refund pass over captured installments
    StartRefund,
    /// The refund pass finished with at least one installment refunded
    CompleteRefund,
}

/// Attempted event is not defined for the current state.
///
/// This is a programming or data error: the caller's state is left
/// unchanged and the attempt should be logged and aborted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transition {transition} is not legal from state {state}")]
pub struct IllegalTransition {
    pub state: OrderState,
    pub transition: OrderTransition,
}

impl OrderState {
    /// Apply one event against the transition table.
    ///
    /// Pure: no side effects, `self` is `Copy` and never mutated. Callers
    /// persist the returned state themselves.
    pub fn apply(self, transition: OrderTransition) -> Result<OrderState, IllegalTransition> {
        use OrderState::*;
        use OrderTransition::*;

        let next = match (self, transition) {
            (Draft, Submit) => Submitted,

            // Routing out of SUBMITTED once the price is frozen
            (Submitted, RequireSignature) => ToSign,
            (Submitted, RequirePaymentMethod) => ToSavePaymentMethod,
            (Submitted, Ready) => Pending,
            (Submitted, Reserve) => ToOwn,
            (Submitted, Validate) => Validated,

            // Contract signed, continue routing
            (ToSign, RequirePaymentMethod) => ToSavePaymentMethod,
            (ToSign, Ready) => Pending,
            (ToSign, Reserve) => ToOwn,

            (ToSavePaymentMethod, Ready) => Pending,

            (ToOwn, Claim) => Pending,

            // Payment progress
            (Pending, InstallmentPaid) => PendingPayment,
            (Pending, Validate) => Validated,
            (PendingPayment, InstallmentPaid) => PendingPayment,
            (PendingPayment, Settle) => Completed,
            (Validated, InstallmentPaid) => PendingPayment,
            (Validated, Settle) => Completed,

            // Cancellation is legal from every pre-terminal state
            (
                Draft | Submitted | ToSign | ToSavePaymentMethod | ToOwn | Pending
                | PendingPayment | Validated,
                Cancel,
            ) => Canceled,

            // Refund pass
            (Canceled, StartRefund) => Refunding,
            (Refunding, CompleteRefund) => Refunded,

            (state, transition) => return Err(IllegalTransition { state, transition }),
        };
        Ok(next)
    }

    /// Terminal states accept no further event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Completed | OrderState::Canceled | OrderState::Refunded
        )
    }

    /// States counted against an offering's seat capacity.
    ///
    /// `TO_OWN` is deliberately not in this set: reserved seats are tracked
    /// separately and subtracted from availability on their own line.
    pub fn is_binding(&self) -> bool {
        matches!(
            self,
            OrderState::Pending
                | OrderState::PendingPayment
                | OrderState::Validated
                | OrderState::Completed
                | OrderState::ToSign
                | OrderState::ToSavePaymentMethod
        )
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderState::Draft => "DRAFT",
            OrderState::Submitted => "SUBMITTED",
            OrderState::Pending => "PENDING",
            OrderState::PendingPayment => "PENDING_PAYMENT",
            OrderState::Validated => "VALIDATED",
            OrderState::ToSavePaymentMethod => "TO_SAVE_PAYMENT_METHOD",
            OrderState::ToSign => "TO_SIGN",
            OrderState::ToOwn => "TO_OWN",
            OrderState::Completed => "COMPLETED",
            OrderState::Canceled => "CANCELED",
            OrderState::Refunding => "REFUNDING",
            OrderState::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for OrderTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderTransition::Submit => "SUBMIT",
            OrderTransition::RequireSignature => "REQUIRE_SIGNATURE",
            OrderTransition::RequirePaymentMethod => "REQUIRE_PAYMENT_METHOD",
            OrderTransition::Ready => "READY",
            OrderTransition::Reserve => "RESERVE",
            OrderTransition::Claim => "CLAIM",
            OrderTransition::Validate => "VALIDATE",
            OrderTransition::InstallmentPaid => "INSTALLMENT_PAID",
            OrderTransition::Settle => "SETTLE",
            OrderTransition::Cancel => "CANCEL",
            OrderTransition::StartRefund => "START_REFUND",
            OrderTransition::CompleteRefund => "COMPLETE_REFUND",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderState::*;
    use OrderTransition::*;

    const ALL_STATES: [OrderState; 12] = [
        Draft,
        Submitted,
        Pending,
        PendingPayment,
        Validated,
        ToSavePaymentMethod,
        ToSign,
        ToOwn,
        Completed,
        Canceled,
        Refunding,
        Refunded,
    ];

    const ALL_TRANSITIONS: [OrderTransition; 12] = [
        Submit,
        RequireSignature,
        RequirePaymentMethod,
        Ready,
        Reserve,
        Claim,
        Validate,
        InstallmentPaid,
        Settle,
        Cancel,
        StartRefund,
        CompleteRefund,
    ];

    #[test]
    fn happy_path_to_completed() {
        let mut state = OrderState::default();
        for t in [Submit, Ready, InstallmentPaid, InstallmentPaid, Settle] {
            state = state.apply(t).unwrap();
        }
        assert_eq!(state, Completed);
        assert!(state.is_terminal());
    }

    #[test]
    fn signature_then_payment_method_detour() {
        let state = Draft
            .apply(Submit)
            .and_then(|s| s.apply(RequireSignature))
            .and_then(|s| s.apply(RequirePaymentMethod))
            .and_then(|s| s.apply(Ready))
            .unwrap();
        assert_eq!(state, Pending);
    }

    #[test]
    fn reserved_seat_is_claimed_into_pending() {
        let state = Draft
            .apply(Submit)
            .and_then(|s| s.apply(Reserve))
            .unwrap();
        assert_eq!(state, ToOwn);
        assert_eq!(state.apply(Claim).unwrap(), Pending);
        // 需签约的预留单: 签约后再入 TO_OWN
        assert_eq!(ToSign.apply(Reserve).unwrap(), ToOwn);
    }

    #[test]
    fn refund_path_goes_through_canceled() {
        let state = Canceled.apply(StartRefund).unwrap();
        assert_eq!(state, Refunding);
        assert_eq!(state.apply(CompleteRefund).unwrap(), Refunded);
        // 不能跳过 CANCELED 直接退款
        assert!(PendingPayment.apply(StartRefund).is_err());
    }

    #[test]
    fn cancel_is_legal_exactly_from_pre_terminal_states() {
        for state in ALL_STATES {
            let result = state.apply(Cancel);
            let expect_legal = !state.is_terminal() && state != Refunding;
            assert_eq!(
                result.is_ok(),
                expect_legal,
                "cancel from {state} should be legal={expect_legal}"
            );
        }
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        for state in [Completed, Refunded] {
            for t in ALL_TRANSITIONS {
                assert!(
                    state.apply(t).is_err(),
                    "{state} must reject {t} but accepted it"
                );
            }
        }
        // CANCELED 只接受 START_REFUND
        for t in ALL_TRANSITIONS {
            assert_eq!(Canceled.apply(t).is_ok(), t == StartRefund);
        }
    }

    #[test]
    fn illegal_transition_reports_both_sides() {
        let err = Completed.apply(Cancel).unwrap_err();
        assert_eq!(err.state, Completed);
        assert_eq!(err.transition, Cancel);
        assert!(err.to_string().contains("CANCEL"));
        assert!(err.to_string().contains("COMPLETED"));
    }

    #[test]
    fn binding_states_match_capacity_rules() {
        let binding: Vec<OrderState> =
            ALL_STATES.iter().copied().filter(|s| s.is_binding()).collect();
        assert_eq!(
            binding,
            vec![Pending, PendingPayment, Validated, ToSavePaymentMethod, ToSign, Completed]
        );
        assert!(!ToOwn.is_binding());
        assert!(!Refunding.is_binding());
    }

    #[test]
    fn wire_format_is_screaming_snake_case() {
        let json = serde_json::to_string(&ToSavePaymentMethod).unwrap();
        assert_eq!(json, "\"TO_SAVE_PAYMENT_METHOD\"");
        let back: OrderState = serde_json::from_str("\"PENDING_PAYMENT\"").unwrap();
        assert_eq!(back, PendingPayment);
    }
}
