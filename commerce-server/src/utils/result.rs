//! 应用结果类型

use super::error::AppError;

/// 应用结果类型别名
///
/// 所有 HTTP handler 都返回这个类型, 错误会自动转换为统一的 JSON 响应。
pub type AppResult<T> = Result<T, AppError>;
