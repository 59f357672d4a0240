//! 统一错误处理
//!
//! 提供应用级错误类型和响应结构：
//! - [`AppError`] - 应用错误枚举
//! - [`AppResponse`] - API 响应结构
//!
//! # 错误码规范
//!
//! | 错误码 | HTTP | 分类 |
//! |--------|------|------|
//! | E0000 | 200 | 成功 |
//! | E0002 | 400 | 验证失败 |
//! | E0003 | 404 | 资源不存在 |
//! | E0004 | 409 | 状态冲突 |
//! | E0005 | 422 | 业务规则违反 |
//! | E0006 | 400 | 无效请求 |
//! | E9001 | 500 | 内部错误 |
//! | E9002 | 500 | 存储错误 |
//!
//! # 使用示例
//!
//! ```ignore
//! // 返回错误
//! Err(AppError::not_found("Order not found"))
//!
//! // 返回成功响应
//! Ok(ok(data))
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::capacity::CapacityError;
use crate::invoicing::InvoiceError;
use crate::orders::manager::ManagerError;

/// API 统一响应结构
///
/// ```json
/// {
///   "code": "E0000",
///   "message": "Success",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AppResponse<T> {
    /// 错误码 (E0000 表示成功)
    pub code: String,
    /// 消息
    pub message: String,
    /// 响应数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// 追踪 ID (可选)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// 应用错误枚举
///
/// 引擎层错误 ([`ManagerError`]) 通过 `From` 映射到这里, HTTP 层只认
/// 这一种错误。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== 业务逻辑错误 (4xx) ==========
    #[error("Resource not found: {0}")]
    /// 资源不存在 (404)
    NotFound(String),

    #[error("State conflict: {0}")]
    /// 状态机冲突 (409)
    Conflict(String),

    #[error("Validation failed: {0}")]
    /// 验证失败 (400)
    Validation(String),

    #[error("Business rule violation: {0}")]
    /// 业务规则违反 (422)
    BusinessRule(String),

    // ========== 系统错误 (5xx) ==========
    #[error("Database error: {0}")]
    /// 存储错误 (500)
    Database(String),

    #[error("Internal server error: {0}")]
    /// 内部错误 (500)
    Internal(String),

    #[error("Invalid request: {0}")]
    /// 无效请求 (400)
    Invalid(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Not found (404)
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "E0003", msg.as_str()),

            // Conflict (409)
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "E0004", msg.as_str()),

            // Validation (400)
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "E0002", msg.as_str()),

            // Business rule (422)
            AppError::BusinessRule(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "E0005", msg.as_str())
            }

            // Database errors (500)
            AppError::Database(msg) => {
                error!(target: "database", error = %msg, "Database error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "E9002", "Database error")
            }

            // Internal errors (500)
            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "E9001",
                    "Internal server error",
                )
            }

            // Invalid request (400)
            AppError::Invalid(msg) => (StatusCode::BAD_REQUEST, "E0006", msg.as_str()),
        };

        let body = Json(AppResponse::<()> {
            code: code.to_string(),
            message: message.to_string(),
            data: None,
            trace_id: None,
        });

        (status, body).into_response()
    }
}

impl From<ManagerError> for AppError {
    fn from(err: ManagerError) -> Self {
        match &err {
            ManagerError::OrderNotFound(_)
            | ManagerError::OfferingNotFound(_)
            | ManagerError::InstallmentNotFound(_)
            | ManagerError::Invoicing(InvoiceError::UnknownInvoice(_)) => {
                AppError::NotFound(err.to_string())
            }

            ManagerError::InvalidOperation(_) => AppError::Validation(err.to_string()),

            ManagerError::IllegalTransition(_)
            | ManagerError::Invoicing(InvoiceError::RootAlreadyExists(_)) => {
                AppError::Conflict(err.to_string())
            }

            ManagerError::Storage(_)
            | ManagerError::Capacity(CapacityError::Storage(_))
            | ManagerError::Invoicing(InvoiceError::Storage(_)) => {
                AppError::Database(err.to_string())
            }

            ManagerError::Capacity(CapacityError::SeatsExhausted { .. })
            | ManagerError::Installments(_)
            | ManagerError::Invoicing(_)
            | ManagerError::Schedule(_) => AppError::BusinessRule(err.to_string()),

            ManagerError::Payment(_) => AppError::Internal(err.to_string()),
        }
    }
}

// ========== Helper Constructors ==========

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

// ========== Helper functions ==========

/// Create a successful response
pub fn ok<T: Serialize>(data: T) -> Json<AppResponse<T>> {
    Json(AppResponse {
        code: "E0000".to_string(),
        message: "Success".to_string(),
        data: Some(data),
        trace_id: None,
    })
}
