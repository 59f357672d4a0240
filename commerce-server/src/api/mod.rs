//! API 路由模块
//!
//! | 前缀 | 模块 | 说明 |
//! |------|------|------|
//! | /health | health | 健康检查 |
//! | /api/orders | orders | 订单生命周期 |
//! | /payment-webhook | webhook | 支付后端回调 |
//!
//! 成功响应直接回资源 JSON; 错误统一走
//! [`AppError`](crate::utils::AppError) 的 `{code, message}` 信封。

pub mod health;
pub mod orders;
pub mod webhook;

use axum::{Router, middleware};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::core::ServerState;

/// Build the Axum app with state and middleware attached
pub fn build_app(state: ServerState) -> Router {
    routes()
        .with_state(state)
        // Tower HTTP 中间件
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        // HTTP 请求日志中间件
        .layer(middleware::from_fn(log_request))
}

fn routes() -> Router<ServerState> {
    Router::<ServerState>::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(webhook::router())
}

/// HTTP 请求日志中间件
async fn log_request(
    request: http::Request<axum::body::Body>,
    next: middleware::Next,
) -> http::Response<axum::body::Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let status = response.status();

    tracing::info!(target: "http_access", "{} {} {}", method, uri, status);

    response
}
