//! 备份服务接口的请求与响应结构

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{BackupCompression, BackupMode, BackupStatus, DataModel};

/// 立即执行一次备份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartBackupRequest {
    pub service_id: String,
    pub location_id: String,
    pub name: String,
    pub retries: u32,
    pub retry_interval: Duration,
    /// MySQL 固定使用物理备份，此字段仅对 MongoDB 生效
    pub data_model: DataModel,
    pub folder: String,
    pub compression: BackupCompression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartBackupResponse {
    pub artifact_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreBackupRequest {
    pub service_id: String,
    pub artifact_id: String,
    /// 仅 PITR 产物需要
    pub pitr_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreBackupResponse {
    pub restore_id: String,
}

/// 创建计划备份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBackupRequest {
    pub service_id: String,
    pub location_id: String,
    pub folder: String,
    pub cron_expression: String,
    /// 首次触发不早于该时间；Unix 零点视为未设置
    pub start_time: Option<DateTime<Utc>>,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub retries: u32,
    pub retry_interval: Duration,
    pub data_model: DataModel,
    pub mode: BackupMode,
    pub retention: u32,
    pub compression: BackupCompression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBackupResponse {
    pub scheduled_backup_id: String,
}

/// 计划备份列表项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledBackup {
    pub scheduled_backup_id: String,
    pub service_id: String,
    pub service_name: String,
    pub location_id: String,
    pub location_name: String,
    pub folder: String,
    pub cron_expression: String,
    pub start_time: Option<DateTime<Utc>>,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub retries: u32,
    pub retry_interval: Duration,
    pub data_model: DataModel,
    pub mode: BackupMode,
    pub vendor: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub retention: u32,
    pub compression: BackupCompression,
    pub running: bool,
    pub error: String,
}

/// 修改计划备份，只更新给出的字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeScheduledBackupRequest {
    pub scheduled_backup_id: String,
    pub enabled: Option<bool>,
    pub cron_expression: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub retention: Option<u32>,
    pub retries: Option<u32>,
    pub retry_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetLogsRequest {
    pub artifact_id: String,
    pub offset: u32,
    /// 0 表示不限制
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogChunk {
    pub chunk_id: u32,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GetLogsResponse {
    pub logs: Vec<LogChunk>,
    /// 已读到最后一块
    pub end: bool,
}

/// 备份产物列表项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactInfo {
    pub artifact_id: String,
    pub name: String,
    pub vendor: String,
    pub location_id: String,
    pub location_name: String,
    pub service_id: String,
    pub service_name: String,
    pub data_model: DataModel,
    pub mode: BackupMode,
    pub status: BackupStatus,
    pub created_at: DateTime<Utc>,
    pub is_sharded_cluster: bool,
    pub folder: String,
    pub compression: BackupCompression,
}

/// 可恢复的时间段
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PitrTimerange {
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
}
