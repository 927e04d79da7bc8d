//! 领域模型：计划任务、备份产物、服务清单与存储位置

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BackupError, Result};

/// 数据库服务类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    MySql,
    MongoDb,
    PostgreSql,
    ProxySql,
    HaProxy,
    External,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::MySql => "mysql",
            ServiceType::MongoDb => "mongodb",
            ServiceType::PostgreSql => "postgresql",
            ServiceType::ProxySql => "proxysql",
            ServiceType::HaProxy => "haproxy",
            ServiceType::External => "external",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql" => Ok(ServiceType::MySql),
            "mongodb" => Ok(ServiceType::MongoDb),
            "postgresql" => Ok(ServiceType::PostgreSql),
            "proxysql" => Ok(ServiceType::ProxySql),
            "haproxy" => Ok(ServiceType::HaProxy),
            "external" => Ok(ServiceType::External),
            other => Err(BackupError::InvalidArgument(format!(
                "invalid service type '{other}'"
            ))),
        }
    }
}

/// 受管数据库服务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub service_id: String,
    pub service_name: String,
    pub service_type: ServiceType,
    /// 所属集群，空字符串表示不属于任何集群
    pub cluster: String,
}

/// 存储位置类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    S3,
    Filesystem,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::S3 => "s3",
            LocationType::Filesystem => "filesystem",
        }
    }
}

impl FromStr for LocationType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s3" => Ok(LocationType::S3),
            "filesystem" => Ok(LocationType::Filesystem),
            other => Err(BackupError::InvalidArgument(format!(
                "invalid location type '{other}'"
            ))),
        }
    }
}

/// S3 兼容存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket_name: String,
    #[serde(default)]
    pub bucket_region: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

/// 本地或挂载文件系统配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilesystemConfig {
    pub path: String,
}

/// 解析后的存储描述，交给 PITR 时间线检查器使用
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    S3(S3Config),
    Filesystem(FilesystemConfig),
}

/// 备份存储位置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupLocation {
    pub id: String,
    pub name: String,
    pub description: String,
    pub location_type: LocationType,
    pub config: serde_json::Value,
}

impl BackupLocation {
    /// 按位置类型解析存储配置
    pub fn storage(&self) -> Result<Storage> {
        match self.location_type {
            LocationType::S3 => Ok(Storage::S3(serde_json::from_value(self.config.clone())?)),
            LocationType::Filesystem => Ok(Storage::Filesystem(serde_json::from_value(
                self.config.clone(),
            )?)),
        }
    }
}

/// 备份数据模型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataModel {
    Physical,
    Logical,
}

impl DataModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataModel::Physical => "physical",
            DataModel::Logical => "logical",
        }
    }
}

impl fmt::Display for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataModel {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(BackupError::InvalidArgument("empty data model".to_string())),
            "physical" => Ok(DataModel::Physical),
            "logical" => Ok(DataModel::Logical),
            other => Err(BackupError::InvalidArgument(format!(
                "invalid data model '{other}'"
            ))),
        }
    }
}

/// 备份模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    Snapshot,
    Incremental,
    Pitr,
}

impl BackupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupMode::Snapshot => "snapshot",
            BackupMode::Incremental => "incremental",
            BackupMode::Pitr => "pitr",
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupMode {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Err(BackupError::InvalidArgument("empty backup mode".to_string())),
            "snapshot" => Ok(BackupMode::Snapshot),
            "incremental" => Ok(BackupMode::Incremental),
            "pitr" => Ok(BackupMode::Pitr),
            other => Err(BackupError::InvalidArgument(format!(
                "invalid backup mode '{other}'"
            ))),
        }
    }
}

/// 备份产物状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Paused,
    Success,
    Error,
    Deleting,
    FailedToDelete,
    CleanupInProgress,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Paused => "paused",
            BackupStatus::Success => "success",
            BackupStatus::Error => "error",
            BackupStatus::Deleting => "deleting",
            BackupStatus::FailedToDelete => "failed_to_delete",
            BackupStatus::CleanupInProgress => "cleanup_in_progress",
        }
    }
}

impl FromStr for BackupStatus {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(BackupStatus::Pending),
            "in_progress" => Ok(BackupStatus::InProgress),
            "paused" => Ok(BackupStatus::Paused),
            "success" => Ok(BackupStatus::Success),
            "error" => Ok(BackupStatus::Error),
            "deleting" => Ok(BackupStatus::Deleting),
            "failed_to_delete" => Ok(BackupStatus::FailedToDelete),
            "cleanup_in_progress" => Ok(BackupStatus::CleanupInProgress),
            other => Err(BackupError::InvalidArgument(format!(
                "invalid backup status '{other}'"
            ))),
        }
    }
}

/// 备份压缩方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupCompression {
    #[default]
    Default,
    None,
    QuickLz,
    Zstd,
    Lz4,
    S2,
    Gzip,
    Snappy,
    Pgzip,
}

const MYSQL_COMPRESSIONS: &[BackupCompression] = &[
    BackupCompression::Default,
    BackupCompression::QuickLz,
    BackupCompression::Zstd,
    BackupCompression::Lz4,
    BackupCompression::None,
];

const MONGODB_COMPRESSIONS: &[BackupCompression] = &[
    BackupCompression::Default,
    BackupCompression::Gzip,
    BackupCompression::Snappy,
    BackupCompression::Lz4,
    BackupCompression::S2,
    BackupCompression::Pgzip,
    BackupCompression::Zstd,
    BackupCompression::None,
];

impl BackupCompression {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupCompression::Default => "default",
            BackupCompression::None => "none",
            BackupCompression::QuickLz => "quicklz",
            BackupCompression::Zstd => "zstd",
            BackupCompression::Lz4 => "lz4",
            BackupCompression::S2 => "s2",
            BackupCompression::Gzip => "gzip",
            BackupCompression::Snappy => "snappy",
            BackupCompression::Pgzip => "pgzip",
        }
    }

    /// 返回指定引擎支持的压缩方式；不支持压缩的引擎返回 None
    pub fn supported_for(service_type: ServiceType) -> Option<&'static [BackupCompression]> {
        match service_type {
            ServiceType::MySql => Some(MYSQL_COMPRESSIONS),
            ServiceType::MongoDb => Some(MONGODB_COMPRESSIONS),
            _ => None,
        }
    }

    /// 校验压缩方式是否适用于该引擎
    pub fn validate_for_service_type(&self, service_type: ServiceType) -> Result<()> {
        let supported = Self::supported_for(service_type).ok_or_else(|| {
            BackupError::Validation(format!(
                "backup compression is not yet supported for service type: {service_type}"
            ))
        })?;

        if !supported.contains(self) {
            return Err(BackupError::Validation(format!(
                "compression '{}' is not supported for service type {service_type}",
                self.as_str()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for BackupCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupCompression {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "default" => Ok(BackupCompression::Default),
            "none" => Ok(BackupCompression::None),
            "quicklz" => Ok(BackupCompression::QuickLz),
            "zstd" => Ok(BackupCompression::Zstd),
            "lz4" => Ok(BackupCompression::Lz4),
            "s2" => Ok(BackupCompression::S2),
            "gzip" => Ok(BackupCompression::Gzip),
            "snappy" => Ok(BackupCompression::Snappy),
            "pgzip" => Ok(BackupCompression::Pgzip),
            other => Err(BackupError::InvalidArgument(format!(
                "invalid compression '{other}'"
            ))),
        }
    }
}

/// 计划任务类型（持久化字段 `type`）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScheduledTaskType {
    MySqlBackup,
    MongoDbBackup,
}

impl ScheduledTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledTaskType::MySqlBackup => "mysql_backup",
            ScheduledTaskType::MongoDbBackup => "mongodb_backup",
        }
    }
}

impl fmt::Display for ScheduledTaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduledTaskType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql_backup" => Ok(ScheduledTaskType::MySqlBackup),
            "mongodb_backup" => Ok(ScheduledTaskType::MongoDbBackup),
            other => Err(BackupError::custom(format!("unknown scheduled task type '{other}'"))),
        }
    }
}

/// 备份类计划任务的公共参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonBackupTaskData {
    pub service_id: String,
    #[serde(default)]
    pub cluster_name: String,
    pub location_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub data_model: DataModel,
    pub mode: BackupMode,
    #[serde(default)]
    pub retention: u32,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub retry_interval: Duration,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub compression: BackupCompression,
}

/// 计划任务载荷，类型与载荷一一对应
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduledTaskData {
    MySqlBackup(CommonBackupTaskData),
    MongoDbBackup(CommonBackupTaskData),
}

impl ScheduledTaskData {
    pub fn task_type(&self) -> ScheduledTaskType {
        match self {
            ScheduledTaskData::MySqlBackup(_) => ScheduledTaskType::MySqlBackup,
            ScheduledTaskData::MongoDbBackup(_) => ScheduledTaskType::MongoDbBackup,
        }
    }

    pub fn common(&self) -> &CommonBackupTaskData {
        match self {
            ScheduledTaskData::MySqlBackup(data) | ScheduledTaskData::MongoDbBackup(data) => data,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonBackupTaskData {
        match self {
            ScheduledTaskData::MySqlBackup(data) | ScheduledTaskData::MongoDbBackup(data) => data,
        }
    }

    /// 根据持久化的类型字段解码 JSON 载荷
    pub fn decode(task_type: &str, json: &str) -> Result<Self> {
        match task_type.parse::<ScheduledTaskType>()? {
            ScheduledTaskType::MySqlBackup => {
                Ok(ScheduledTaskData::MySqlBackup(serde_json::from_str(json)?))
            }
            ScheduledTaskType::MongoDbBackup => {
                Ok(ScheduledTaskData::MongoDbBackup(serde_json::from_str(json)?))
            }
        }
    }

    /// 编码为 JSON 载荷
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self.common())?)
    }
}

/// 计划任务（数据库中的权威状态）
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub id: String,
    pub cron_expression: String,
    pub start_at: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub data: ScheduledTaskData,
    pub disabled: bool,
    pub running: bool,
    /// 最近一次执行的错误信息，成功时为空
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn task_type(&self) -> ScheduledTaskType {
        self.data.task_type()
    }
}

/// 新建计划任务参数
#[derive(Debug, Clone)]
pub struct CreateScheduledTaskParams {
    pub cron_expression: String,
    pub start_at: Option<DateTime<Utc>>,
    pub data: ScheduledTaskData,
    pub disabled: bool,
}

/// 备份任务载荷的部分修改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupTaskDataChange {
    pub name: Option<String>,
    pub description: Option<String>,
    pub retention: Option<u32>,
    pub retries: Option<u32>,
    pub retry_interval: Option<Duration>,
}

impl BackupTaskDataChange {
    pub fn apply(self, data: &mut ScheduledTaskData) {
        let common = data.common_mut();
        if let Some(name) = self.name {
            common.name = name;
        }
        if let Some(description) = self.description {
            common.description = description;
        }
        if let Some(retention) = self.retention {
            common.retention = retention;
        }
        if let Some(retries) = self.retries {
            common.retries = retries;
        }
        if let Some(retry_interval) = self.retry_interval {
            common.retry_interval = retry_interval;
        }
    }
}

/// 计划任务部分更新参数，只修改有值的字段
#[derive(Debug, Clone, Default)]
pub struct ChangeScheduledTaskParams {
    pub data: Option<ScheduledTaskData>,
    /// 在 `data`（或现有载荷）之上再修改的字段，与读取在同一事务内合并
    pub data_change: BackupTaskDataChange,
    pub cron_expression: Option<String>,
    pub disable: Option<bool>,
    pub running: Option<bool>,
    pub error: Option<String>,
    /// `Some(None)` 表示清空
    pub next_run: Option<Option<DateTime<Utc>>>,
    pub last_run: Option<Option<DateTime<Utc>>>,
}

/// 计划任务查询条件
#[derive(Debug, Clone, Default)]
pub struct ScheduledTasksFilter {
    pub types: Vec<ScheduledTaskType>,
    pub disabled: Option<bool>,
    pub service_id: Option<String>,
    pub location_id: Option<String>,
    pub cluster_name: Option<String>,
    pub folder: Option<String>,
    pub mode: Option<BackupMode>,
}

impl ScheduledTasksFilter {
    pub fn matches(&self, task: &ScheduledTask) -> bool {
        let data = task.data.common();
        (self.types.is_empty() || self.types.contains(&task.task_type()))
            && self.disabled.is_none_or(|d| d == task.disabled)
            && self.service_id.as_ref().is_none_or(|v| *v == data.service_id)
            && self.location_id.as_ref().is_none_or(|v| *v == data.location_id)
            && self.cluster_name.as_ref().is_none_or(|v| *v == data.cluster_name)
            && self.folder.as_ref().is_none_or(|v| *v == data.folder)
            && self.mode.is_none_or(|m| m == data.mode)
    }
}

/// 备份产物
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub service_id: String,
    pub location_id: String,
    pub data_model: DataModel,
    pub mode: BackupMode,
    pub status: BackupStatus,
    pub compression: BackupCompression,
    /// 产生该产物的计划任务，计划删除后置空
    pub schedule_id: Option<String>,
    pub folder: String,
    pub is_sharded_cluster: bool,
    pub metadata_list: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建备份产物参数
#[derive(Debug, Clone)]
pub struct CreateArtifactParams {
    pub name: String,
    pub vendor: String,
    pub service_id: String,
    pub location_id: String,
    pub data_model: DataModel,
    pub mode: BackupMode,
    pub status: BackupStatus,
    pub compression: BackupCompression,
    pub schedule_id: Option<String>,
    pub folder: String,
    pub is_sharded_cluster: bool,
}

/// 备份产物查询条件
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilters {
    pub service_id: Option<String>,
    pub location_id: Option<String>,
    pub schedule_id: Option<String>,
    pub folder: Option<String>,
    pub status: Option<BackupStatus>,
}

impl ArtifactFilters {
    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.service_id.as_ref().is_none_or(|v| *v == artifact.service_id)
            && self.location_id.as_ref().is_none_or(|v| *v == artifact.location_id)
            && self
                .schedule_id
                .as_ref()
                .is_none_or(|v| artifact.schedule_id.as_ref() == Some(v))
            && self.folder.as_ref().is_none_or(|v| *v == artifact.folder)
            && self.status.is_none_or(|s| s == artifact.status)
    }
}

/// 作业类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobType {
    #[serde(rename = "mysql_backup")]
    MySqlBackup,
    #[serde(rename = "mongodb_backup")]
    MongoDbBackup,
    #[serde(rename = "mysql_restore")]
    MySqlRestore,
    #[serde(rename = "mongodb_restore")]
    MongoDbRestore,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::MySqlBackup => "mysql_backup",
            JobType::MongoDbBackup => "mongodb_backup",
            JobType::MySqlRestore => "mysql_restore",
            JobType::MongoDbRestore => "mongodb_restore",
        }
    }
}

impl FromStr for JobType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mysql_backup" => Ok(JobType::MySqlBackup),
            "mongodb_backup" => Ok(JobType::MongoDbBackup),
            "mysql_restore" => Ok(JobType::MySqlRestore),
            "mongodb_restore" => Ok(JobType::MongoDbRestore),
            other => Err(BackupError::custom(format!("unknown job type '{other}'"))),
        }
    }
}

/// 执行作业（由执行器创建）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub service_id: String,
    pub artifact_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 作业日志分块
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobLog {
    pub job_id: String,
    pub chunk_id: u32,
    pub data: String,
    pub last_chunk: bool,
}
