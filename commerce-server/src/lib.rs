//! Commerce Server - 订单财务引擎
//!
//! # 架构概述
//!
//! 本模块是订单后端的主入口，提供以下核心功能：
//!
//! - **订单引擎** (`orders`): 状态机驱动的订单生命周期，分期计划与退款
//! - **发票账本** (`invoicing`): 根发票 + 贷记单层级，余额与号段
//! - **容量准入** (`capacity`): 按规则限座，组织自动分配
//! - **支付后端** (`payment`): 注册/退款抽象，HTTP 与演练实现
//! - **HTTP API** (`api`): RESTful API 接口 + 支付回调
//!
//! # 模块结构
//!
//! ```text
//! commerce-server/src/
//! ├── core/          # 配置、状态、HTTP 服务器
//! ├── api/           # HTTP 路由和处理器
//! ├── orders/        # 订单引擎: 状态机、计划、分期、退款
//! ├── invoicing/     # 发票账本与引用号段
//! ├── capacity/      # 容量准入与组织分配
//! ├── payment/       # 支付后端抽象
//! ├── notify/        # 通知出口
//! ├── storage.rs     # redb 存储层
//! └── utils/         # 错误映射、日志
//! ```

pub mod api;
pub mod capacity;
pub mod core;
pub mod invoicing;
pub mod notify;
pub mod orders;
pub mod payment;
pub mod storage;
pub mod utils;

// Re-export 公共类型
pub use self::core::{Config, Server, ServerState};
pub use capacity::CapacityAllocator;
pub use invoicing::{InvoiceLedger, ReferenceSequencer};
pub use orders::{ManagerError, OrdersManager, PaymentScheduleBuilder};
pub use storage::LedgerStorage;
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
   ______
  / ____/___  ____ ___  ____ ___  ___  _____________
 / /   / __ \/ __ `__ \/ __ `__ \/ _ \/ ___/ ___/ _ \
/ /___/ /_/ / / / / / / / / / / /  __/ /  / /__/  __/
\____/\____/_/ /_/ /_/_/ /_/ /_/\___/_/   \___/\___/
    "#
    );
}

/// 进程环境准备 (dotenv, 日志目录, 日志系统)
pub fn setup_environment() -> anyhow::Result<()> {
    // .env 不存在也没关系
    dotenv::dotenv().ok();

    let log_dir = std::env::var("LOG_DIR").ok();
    if let Some(dir) = &log_dir {
        std::fs::create_dir_all(dir)?;
    }

    let log_level = std::env::var("LOG_LEVEL").ok();
    utils::logger::init_logger_with_file(log_level.as_deref(), log_dir.as_deref());

    Ok(())
}
