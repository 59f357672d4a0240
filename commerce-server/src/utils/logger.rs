//! 日志系统初始化
//!
//! 基于 tracing 的结构化日志:
//! - 控制台输出 (默认)
//! - 可选的按天滚动文件输出 (`LOG_DIR`)
//! - 级别过滤遵循 `RUST_LOG`, 其次是显式级别参数

use tracing_subscriber::EnvFilter;

/// 初始化控制台日志 (info 级别)
pub fn init_logger() {
    init_logger_with_file(None, None);
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先; 没有设置时用 `log_level` (默认 `info`)。
/// `log_dir` 存在时日志写入按天滚动的文件, 否则落到 stdout。
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.unwrap_or("info")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "commerce-server");
            builder.with_writer(file_appender).with_ansi(false).init();
        }
        None => builder.init(),
    }
}
