//! Payment Webhook Module
//!
//! 支付后端的回调入口。后端对每笔注册过的分期推送状态通知,
//! 这里是订单推进的唯一支付信号来源。
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /payment-webhook | POST | 支付状态通知 |

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

/// Webhook router
pub fn router() -> Router<ServerState> {
    Router::new().route("/payment-webhook", post(handler::receive))
}
