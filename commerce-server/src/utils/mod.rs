//! 工具模块
//!
//! 横切关注点: 错误映射、结果别名、日志初始化。

pub mod error;
pub mod logger;
pub mod result;

pub use error::{AppError, AppResponse, ok};
pub use result::AppResult;
