//! Payment Webhook Handler

use axum::{Json, extract::State};

use shared::order::{NotificationAck, PaymentNotification};

use crate::core::ServerState;
use crate::utils::AppResult;

/// Receive a payment state notification
///
/// 重放的通知会被吞掉并回 `processed: false`, 后端照常收到 200,
/// 不会无限重试。
pub async fn receive(
    State(state): State<ServerState>,
    Json(payload): Json<PaymentNotification>,
) -> AppResult<Json<NotificationAck>> {
    let ack = state.manager.handle_notification(payload).await?;
    Ok(Json(ack))
}
