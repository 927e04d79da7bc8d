//! 日志初始化
//!
//! 库内部只通过 `tracing` 宏记录日志，订阅者由宿主程序决定：
//! - `setup_logging()`：完整配置，适合作为独立服务运行时调用
//! - `setup_minimal_logging()`：最小化配置，已有全局订阅者时静默忽略
//!
//! ## 环境变量
//! - `RUST_LOG`：标准的日志级别控制（如 `backup_core::scheduler=debug`）
//! - `BACKUP_LOG_FILE`：日志文件路径，设置后日志输出到文件而非终端

use crate::constants::logging::LOG_FILE_ENV;
use crate::error::Result;
use tracing_subscriber::{EnvFilter, fmt};

/// 初始化全局日志订阅者
pub fn setup_logging(verbose: bool) -> Result<()> {
    // 根据verbose参数和环境变量确定日志级别
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 检查环境变量，决定是否输出到文件
    if let Ok(log_file) = std::env::var(LOG_FILE_ENV) {
        // 输出到文件 - 使用详细格式便于调试
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;

        fmt()
            .with_env_filter(env_filter)
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_line_number(true)
            .try_init()
            .map_err(|e| crate::BackupError::custom(format!("日志初始化失败: {e}")))?;
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .try_init()
            .map_err(|e| crate::BackupError::custom(format!("日志初始化失败: {e}")))?;
    }

    Ok(())
}

/// 为库使用提供的简化日志初始化
///
/// 如果已经有全局订阅者，这里会返回错误，我们忽略它
pub fn setup_minimal_logging() {
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}
