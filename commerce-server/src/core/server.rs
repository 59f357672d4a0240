//! HTTP 服务器
//!
//! 绑定监听端口, 挂载 API 路由, 并处理优雅停机。

use std::net::SocketAddr;

use tracing::info;

use crate::api;
use crate::core::{Config, ServerState};

/// HTTP 服务器
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    /// 创建服务器 (状态在 run 时初始化)
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// 使用已初始化的状态创建服务器
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    /// 运行服务器直到收到停机信号
    pub async fn run(self) -> anyhow::Result<()> {
        let state = match self.state {
            Some(state) => state,
            None => ServerState::initialize(&self.config)?,
        };

        let app = api::build_app(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        tracing::info!("🚀 Starting HTTP server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// 等待停机信号 (Ctrl+C 或 SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
