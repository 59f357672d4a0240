//! 服务器配置
//!
//! 所有配置都来自环境变量, 每个字段带默认值:
//!
//! | 变量 | 默认值 | 说明 |
//! |------|--------|------|
//! | `WORK_DIR` | `/var/lib/commerce` | 数据目录 (redb 文件所在) |
//! | `HTTP_PORT` | `3000` | HTTP 监听端口 |
//! | `CURRENCY` | `EUR` | 订单计价货币 (ISO 4217) |
//! | `PAYMENT_BACKEND_URL` | 无 | 支付后端地址; 不设置时用演练后端 |
//! | `ENVIRONMENT` | `development` | 运行环境 (development/production) |

use std::env;
use std::path::{Path, PathBuf};

/// 服务器配置
#[derive(Debug, Clone)]
pub struct Config {
    /// 数据目录
    pub work_dir: String,
    /// HTTP 端口
    pub http_port: u16,
    /// 订单货币 (ISO 4217)
    pub currency: String,
    /// 支付后端地址 (不设置时用演练后端)
    pub payment_backend_url: Option<String>,
    /// 运行环境
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            work_dir: env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/commerce".to_string()),
            http_port: env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "EUR".to_string()),
            payment_backend_url: env::var("PAYMENT_BACKEND_URL").ok(),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// 使用自定义值创建配置 (主要用于测试)
    pub fn with_overrides(work_dir: &str, http_port: u16) -> Self {
        Self {
            work_dir: work_dir.to_string(),
            http_port,
            currency: "EUR".to_string(),
            payment_backend_url: None,
            environment: "development".to_string(),
        }
    }

    /// 订单数据库文件路径
    pub fn db_path(&self) -> PathBuf {
        Path::new(&self.work_dir).join("orders.redb")
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
