use crate::constants::{backup, config, scheduler};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub backup: BackupLimitsConfig,
}

/// 数据库相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// 数据库文件路径，":memory:" 表示内存数据库
    pub path: String,
}

/// 调度器相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
}

/// 备份参数上限
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BackupLimitsConfig {
    pub max_retries: u32,
    pub max_retry_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: config::get_default_db_path().to_string_lossy().to_string(),
            },
            scheduler: SchedulerConfig {
                tick_interval_ms: scheduler::DEFAULT_TICK_INTERVAL_MS,
            },
            backup: BackupLimitsConfig {
                max_retries: backup::MAX_RETRIES,
                max_retry_interval_secs: backup::MAX_RETRY_INTERVAL.as_secs(),
            },
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：backup-engine.toml -> .backup-engine.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_FILE_NAMES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        // 如果没找到配置文件，创建默认配置
        let default_file = config::CONFIG_FILE_NAMES[0];
        tracing::warn!("未找到配置文件，创建默认配置: {}", default_file);
        let default_config = Self::default();
        default_config.save_to_file(default_file)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// 是否使用内存数据库
    pub fn is_memory_database(&self) -> bool {
        self.database.path == ":memory:"
    }

    /// 获取数据库文件路径
    pub fn get_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms.max(1))
    }

    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_secs(self.backup.max_retry_interval_secs)
    }
}
