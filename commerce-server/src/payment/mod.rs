//! Payment backend seam
//!
//! The engine never talks money movement itself; it asks a
//! [`PaymentBackend`] to register payments and execute refunds, and learns
//! about captures through the webhook. Backend calls are synchronous
//! network calls from the caller's point of view: transient failures are
//! retried with exponential backoff, permanent rejections surface
//! immediately.

pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::order::{BillingAddress, Installment, Order};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use http::HttpPaymentBackend;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

/// Payment backend failures, split by whether a retry can help
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// Network trouble or backend overload; retried with backoff
    #[error("transient payment backend failure: {0}")]
    Transient(String),

    /// The backend rejected the request; retrying cannot change the answer
    #[error("payment backend rejected the request: {0}")]
    Permanent(String),
}

/// Result of registering a payment intent
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub payment_id: String,
}

/// External payment provider operations
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// Register a payment for one installment; the capture itself is
    /// reported later through the webhook
    async fn create_payment(
        &self,
        order: &Order,
        installment: &Installment,
        billing_address: Option<&BillingAddress>,
    ) -> Result<CreatedPayment, PaymentError>;

    /// Reverse a captured payment, returning the backend refund reference
    async fn refund(
        &self,
        payment_reference: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<String, PaymentError>;
}

/// Run a backend call up to [`MAX_ATTEMPTS`] times.
///
/// Only transient failures are retried; the delay doubles per attempt from
/// `base_delay`, capped at one minute. Exhaustion returns the last error to
/// the caller as a fatal failure, never a silent drop.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    base_delay: Duration,
    mut call: F,
) -> Result<T, PaymentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PaymentError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(PaymentError::Transient(reason)) => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    warn!(operation, attempt, error = %reason, "payment backend retries exhausted");
                    return Err(PaymentError::Transient(reason));
                }
                // Exponential backoff: delay = base * 2^(attempt-1), capped
                let delay = (base_delay * 2u32.pow(attempt - 1)).min(RETRY_MAX_DELAY);
                warn!(operation, attempt, ?delay, error = %reason, "payment backend call failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// In-process backend that approves everything, for local runs and tests
#[derive(Debug, Default, Clone)]
pub struct DummyPaymentBackend;

#[async_trait]
impl PaymentBackend for DummyPaymentBackend {
    async fn create_payment(
        &self,
        order: &Order,
        installment: &Installment,
        _billing_address: Option<&BillingAddress>,
    ) -> Result<CreatedPayment, PaymentError> {
        let payment_id = format!("dum-pay-{}", Uuid::new_v4());
        debug!(
            order_id = %order.id,
            installment_id = %installment.id,
            payment_id = %payment_id,
            "dummy payment created"
        );
        Ok(CreatedPayment { payment_id })
    }

    async fn refund(
        &self,
        payment_reference: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<String, PaymentError> {
        let refund_id = format!("dum-ref-{}", Uuid::new_v4());
        debug!(payment_reference, %amount, currency, refund_id = %refund_id, "dummy refund executed");
        Ok(refund_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(5);
        assert_eq!((base * 2u32.pow(0)).min(RETRY_MAX_DELAY), Duration::from_secs(5));
        assert_eq!((base * 2u32.pow(1)).min(RETRY_MAX_DELAY), Duration::from_secs(10));
        assert_eq!((base * 2u32.pow(4)).min(RETRY_MAX_DELAY), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn transient_failures_retry_three_times_total() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), PaymentError> =
            with_retry("create_payment", Duration::from_millis(1), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PaymentError::Transient("connection reset".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(PaymentError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_when_a_retry_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry("refund", Duration::from_millis(1), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                    Err(PaymentError::Transient("timeout".to_string()))
                } else {
                    Ok("ref-1".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ref-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failures_do_not_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), PaymentError> =
            with_retry("refund", Duration::from_millis(1), || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PaymentError::Permanent("card expired".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(PaymentError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dummy_backend_always_approves() {
        let backend = DummyPaymentBackend;
        let order = Order::new("user", "off-1", Decimal::from(100), "EUR");
        let installment = Installment::new(Decimal::from(100), "EUR", shared::util::today());

        let created = backend
            .create_payment(&order, &installment, None)
            .await
            .unwrap();
        assert!(created.payment_id.starts_with("dum-pay-"));

        let refund = backend.refund(&created.payment_id, Decimal::from(100), "EUR").await;
        assert!(refund.unwrap().starts_with("dum-ref-"));
    }
}
