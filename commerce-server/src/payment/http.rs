//! HTTP payment backend via REST API (no provider SDK dependency)
//!
//! Status codes map onto the retry policy: transport failures and 5xx are
//! transient, any 4xx is a permanent rejection.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::order::{BillingAddress, Installment, Order};

use super::{CreatedPayment, PaymentBackend, PaymentError};

#[derive(Debug, Clone)]
pub struct HttpPaymentBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CreatePaymentRequest<'a> {
    order_id: &'a str,
    installment_id: &'a str,
    amount: Decimal,
    currency: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    billing_address: Option<&'a BillingAddress>,
}

#[derive(Deserialize)]
struct CreatePaymentResponse {
    payment_id: String,
}

#[derive(Serialize)]
struct RefundRequest<'a> {
    payment_reference: &'a str,
    amount: Decimal,
    currency: &'a str,
}

#[derive(Deserialize)]
struct RefundResponse {
    refund_id: String,
}

impl HttpPaymentBackend {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, PaymentError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PaymentError::Transient(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(PaymentError::Transient(format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PaymentError::Permanent(format!(
                "{url}: HTTP {status}: {detail}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::Permanent(format!("{url}: malformed response: {e}")))
    }
}

#[async_trait]
impl PaymentBackend for HttpPaymentBackend {
    async fn create_payment(
        &self,
        order: &Order,
        installment: &Installment,
        billing_address: Option<&BillingAddress>,
    ) -> Result<CreatedPayment, PaymentError> {
        let request = CreatePaymentRequest {
            order_id: &order.id,
            installment_id: &installment.id,
            amount: installment.amount,
            currency: &installment.currency,
            billing_address,
        };
        let response: CreatePaymentResponse = self.post_json("/payments", &request).await?;
        Ok(CreatedPayment {
            payment_id: response.payment_id,
        })
    }

    async fn refund(
        &self,
        payment_reference: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<String, PaymentError> {
        let request = RefundRequest {
            payment_reference,
            amount,
            currency,
        };
        let response: RefundResponse = self.post_json("/refunds", &request).await?;
        Ok(response.refund_id)
    }
}
