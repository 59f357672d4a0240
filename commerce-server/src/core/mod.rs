//! 核心模块
//!
//! 服务器骨架: 配置加载、共享状态、HTTP 服务器生命周期。

pub mod config;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::Server;
pub use state::ServerState;
