/// 备份参数限制
pub mod backup {
    use std::time::Duration;

    /// 单次备份最大重试次数
    pub const MAX_RETRIES: u32 = 10;

    /// 最大重试间隔（8小时）
    pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(8 * 60 * 60);
}

/// 调度器相关常量
pub mod scheduler {
    /// 默认调度轮询间隔（毫秒）
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
}

/// 配置文件相关常量
pub mod config {
    use std::path::PathBuf;

    /// 配置文件查找顺序
    pub const CONFIG_FILE_NAMES: [&str; 2] = ["backup-engine.toml", ".backup-engine.toml"];

    /// 默认数据库文件名
    pub const DEFAULT_DB_FILE: &str = "backup_engine.db";

    /// 默认数据目录
    pub const DATA_DIR_NAME: &str = "data";

    /// 获取默认数据库路径
    pub fn get_default_db_path() -> PathBuf {
        PathBuf::from(".").join(DATA_DIR_NAME).join(DEFAULT_DB_FILE)
    }
}

/// 日志相关常量
pub mod logging {
    /// 设置后日志输出到该文件
    pub const LOG_FILE_ENV: &str = "BACKUP_LOG_FILE";
}

/// 数据库重试参数
pub mod database {
    /// 读操作最大重试次数
    pub const MAX_READ_RETRIES: usize = 3;

    /// 重试基础间隔（毫秒）
    pub const RETRY_BASE_DELAY_MS: u64 = 100;
}
