//! 服务器共享状态
//!
//! [`ServerState`] 持有配置和订单引擎的共享引用, 被所有 HTTP
//! handler 克隆使用。

use std::sync::Arc;

use tracing::info;

use crate::core::config::Config;
use crate::orders::{OrdersManager, ScheduleTiers};
use crate::payment::HttpPaymentBackend;

/// 服务器共享状态
#[derive(Debug, Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 订单引擎
    pub manager: Arc<OrdersManager>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 打开 (或创建) 数据目录和订单数据库, 并按配置接入支付后端。
    pub fn initialize(config: &Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.work_dir)?;

        let mut manager = OrdersManager::new(
            config.db_path(),
            &config.currency,
            ScheduleTiers::standard(),
        )?;

        match &config.payment_backend_url {
            Some(url) => {
                manager.set_payment_backend(Arc::new(HttpPaymentBackend::new(url)));
                info!(backend = %url, "Payment backend attached");
            }
            None => {
                // 没配支付后端就用演练后端, 开发环境常态
                info!("No payment backend configured, using the dry-run backend");
            }
        }

        info!(
            db = %config.db_path().display(),
            currency = %config.currency,
            "Server state initialized"
        );

        Ok(Self {
            config: config.clone(),
            manager: Arc::new(manager),
        })
    }

    /// 内存态状态 (测试用)
    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::storage::LedgerStorage;

        let storage = LedgerStorage::open_in_memory().unwrap();
        Self {
            config: Config::with_overrides("/tmp/commerce-test", 0),
            manager: Arc::new(OrdersManager::with_storage(storage)),
        }
    }
}
