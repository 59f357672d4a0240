//! Order API Handlers
//!
//! 薄封装: 解出请求体, 调用 [`OrdersManager`](crate::orders::OrdersManager),
//! 引擎错误经 `From<ManagerError>` 映射成统一响应。

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use shared::models::InvoiceBalances;
use shared::order::{Order, OrderClaim, OrderCreate, OrderSubmit, PaymentMethodAttach, RefundReport};

use crate::core::ServerState;
use crate::utils::AppResult;

/// Create a draft order
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<OrderCreate>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let order = state.manager.create_order(payload)?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.manager.get_order(&id)?;
    Ok(Json(order))
}

/// Submit a draft: freeze the price, build the schedule, open the invoice
pub async fn submit(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<OrderSubmit>,
) -> AppResult<Json<Order>> {
    let order = state.manager.submit_order(&id, payload)?;
    Ok(Json(order))
}

/// Attach a payment method to an order waiting for one
pub async fn attach_payment_method(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<PaymentMethodAttach>,
) -> AppResult<Json<Order>> {
    let order = state.manager.attach_payment_method(&id, payload)?;
    Ok(Json(order))
}

/// Record the signature receipt for a contract-gated order
pub async fn sign(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.manager.sign_contract(&id)?;
    Ok(Json(order))
}

/// Claim a reserved order for its final owner
pub async fn claim(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(payload): Json<OrderClaim>,
) -> AppResult<Json<Order>> {
    let order = state.manager.claim_order(&id, payload)?;
    Ok(Json(order))
}

/// Register the first pending installment with the payment backend
pub async fn pay(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.manager.initiate_payment(&id).await?;
    Ok(Json(order))
}

/// Cancel an open order
pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.manager.cancel_order(&id)?;
    Ok(Json(order))
}

/// Refund the captured installments of a canceled order
///
/// 退款逐期走支付后端, 可能比较久, 所以回 202 带聚合报告。
pub async fn refund(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<RefundReport>)> {
    let report = state.manager.refund_order(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(report)))
}

/// Invoice balances for an order (root invoice + credit notes + transactions)
pub async fn invoice(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<InvoiceBalances>> {
    let balances = state.manager.invoice_balances(&id)?;
    Ok(Json(balances))
}
