//! Order API Module
//!
//! # 路由列表
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/orders | POST | 创建订单 (草稿) |
//! | /api/orders/{id} | GET | 查询订单 |
//! | /api/orders/{id}/submit | POST | 提交订单 (冻结价格/计划) |
//! | /api/orders/{id}/payment-method | POST | 绑定支付方式 |
//! | /api/orders/{id}/sign | POST | 合同签署回执 |
//! | /api/orders/{id}/claim | POST | 认领预留订单 |
//! | /api/orders/{id}/pay | POST | 发起首期支付 |
//! | /api/orders/{id}/cancel | POST | 取消订单 |
//! | /api/orders/{id}/refund | POST | 退款已取消的订单 (202) |
//! | /api/orders/{id}/invoice | GET | 发票余额 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create))
        .route("/{id}", get(handler::get_by_id))
        // Lifecycle transitions
        .route("/{id}/submit", post(handler::submit))
        .route("/{id}/payment-method", post(handler::attach_payment_method))
        .route("/{id}/sign", post(handler::sign))
        .route("/{id}/claim", post(handler::claim))
        .route("/{id}/pay", post(handler::pay))
        .route("/{id}/cancel", post(handler::cancel))
        .route("/{id}/refund", post(handler::refund))
        // Financial views
        .route("/{id}/invoice", get(handler::invoice))
}
