//! 备份执行器接口
//!
//! 具体的备份/恢复由各引擎的执行适配器完成（xtrabackup、pbm 等），
//! 本库只依赖这里定义的窄接口。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{BackupCompression, BackupMode, DataModel};

/// 执行器返回的领域错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("{0}")]
    AgentNotSupported(String),

    #[error("xtrabackup is not installed")]
    XtrabackupNotInstalled,

    #[error("invalid xtrabackup: {0}")]
    InvalidXtrabackup(String),

    #[error("incompatible xtrabackup: {0}")]
    IncompatibleXtrabackup(String),

    #[error("incompatible target MySQL: {0}")]
    IncompatibleTargetMySql(String),

    #[error("incompatible target MongoDB: {0}")]
    IncompatibleTargetMongoDb(String),

    #[error("timestamp is out of range: {0}")]
    TimestampOutOfRange(String),

    #[error("another operation is in progress: {0}")]
    AnotherOperationInProgress(String),

    #[error("artifact is not ready: {0}")]
    ArtifactNotReady(String),

    #[error("incompatible pbm: {0}")]
    IncompatiblePbm(String),

    #[error("incompatible location type: {0}")]
    IncompatibleLocationType(String),

    #[error("incompatible service: {0}")]
    IncompatibleService(String),

    #[error("incompatible artifact mode: {0}")]
    IncompatibleArtifactMode(String),

    #[error("backup execution failed: {0}")]
    Failed(String),
}

/// 执行一次备份所需的参数
#[derive(Debug, Clone, PartialEq)]
pub struct PerformBackupParams {
    pub service_id: String,
    pub location_id: String,
    pub name: String,
    /// 由计划任务触发时携带计划 ID，手动备份为 None
    pub schedule_id: Option<String>,
    pub data_model: DataModel,
    pub mode: BackupMode,
    pub retries: u32,
    pub retry_interval: Duration,
    pub folder: String,
    pub compression: BackupCompression,
}

#[async_trait]
pub trait BackupExecutor: Send + Sync {
    /// 执行备份，返回备份产物 ID
    async fn perform_backup(
        &self,
        cancel: CancellationToken,
        params: PerformBackupParams,
    ) -> Result<String>;

    /// 从产物恢复，返回恢复记录 ID
    async fn restore_backup(
        &self,
        cancel: CancellationToken,
        service_id: &str,
        artifact_id: &str,
        pitr_timestamp: Option<DateTime<Utc>>,
    ) -> Result<String>;

    /// 开启或关闭 MongoDB 集群的 PITR
    async fn switch_mongo_pitr(
        &self,
        cancel: CancellationToken,
        service_id: &str,
        enabled: bool,
    ) -> Result<()>;
}
