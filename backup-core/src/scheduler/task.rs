//! 计划任务定义：构造时完成参数校验，执行时委托给备份执行器

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backup::executor::PerformBackupParams;
use crate::error::{BackupError, Result};
use crate::models::{
    BackupMode, CommonBackupTaskData, DataModel, ScheduledTaskData, ScheduledTaskType,
};
use crate::scheduler::Scheduler;

/// 备份任务参数
pub type BackupTaskParams = CommonBackupTaskData;

/// 可调度任务
#[async_trait]
pub trait Task: Send + Sync {
    /// 执行任务；`cancel` 被取消时应尽快返回
    async fn run(&self, cancel: CancellationToken, scheduler: &Scheduler) -> Result<()>;

    /// 计划任务 ID，尚未持久化时为空
    fn id(&self) -> &str;

    fn task_type(&self) -> ScheduledTaskType;

    fn data(&self) -> ScheduledTaskData;
}

fn validate_common(params: &BackupTaskParams) -> Result<()> {
    if params.name.is_empty() {
        return Err(BackupError::Validation("backup name can't be empty".to_string()));
    }
    if params.service_id.is_empty() {
        return Err(BackupError::Validation("service id can't be empty".to_string()));
    }
    if params.location_id.is_empty() {
        return Err(BackupError::Validation("location id can't be empty".to_string()));
    }
    Ok(())
}

/// 调用执行器完成一次备份，取消时立即返回
async fn perform_backup(
    id: &str,
    params: &BackupTaskParams,
    cancel: CancellationToken,
    scheduler: &Scheduler,
) -> Result<()> {
    let perform = PerformBackupParams {
        service_id: params.service_id.clone(),
        location_id: params.location_id.clone(),
        name: params.name.clone(),
        schedule_id: Some(id.to_string()),
        data_model: params.data_model,
        mode: params.mode,
        retries: params.retries,
        retry_interval: params.retry_interval,
        folder: params.folder.clone(),
        compression: params.compression,
    };

    let executor = scheduler.backup_executor();
    let token = cancel.clone();
    tokio::select! {
        result = executor.perform_backup(token, perform) => {
            let artifact_id = result?;
            info!(task_id = %id, artifact_id = %artifact_id, "计划备份已提交");
            Ok(())
        }
        _ = cancel.cancelled() => {
            debug!(task_id = %id, "计划备份已取消");
            Err(BackupError::Cancelled)
        }
    }
}

/// MySQL 物理快照备份任务
#[derive(Debug, Clone)]
pub struct MySqlBackupTask {
    id: String,
    params: BackupTaskParams,
}

impl MySqlBackupTask {
    pub fn new(params: BackupTaskParams) -> Result<Self> {
        validate_common(&params)?;

        if params.data_model != DataModel::Physical {
            return Err(BackupError::Validation(format!(
                "unsupported backup data model for mySQL: {}",
                params.data_model
            )));
        }
        if params.mode != BackupMode::Snapshot {
            return Err(BackupError::Validation(format!(
                "unsupported backup mode for mySQL: {}",
                params.mode
            )));
        }

        Ok(Self {
            id: String::new(),
            params,
        })
    }

    pub(crate) fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }
}

#[async_trait]
impl Task for MySqlBackupTask {
    async fn run(&self, cancel: CancellationToken, scheduler: &Scheduler) -> Result<()> {
        perform_backup(&self.id, &self.params, cancel, scheduler).await
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn task_type(&self) -> ScheduledTaskType {
        ScheduledTaskType::MySqlBackup
    }

    fn data(&self) -> ScheduledTaskData {
        ScheduledTaskData::MySqlBackup(self.params.clone())
    }
}

/// MongoDB 备份任务（快照或 PITR）
#[derive(Debug, Clone)]
pub struct MongoDbBackupTask {
    id: String,
    params: BackupTaskParams,
}

impl MongoDbBackupTask {
    pub fn new(params: BackupTaskParams) -> Result<Self> {
        validate_common(&params)?;

        if params.mode == BackupMode::Incremental {
            return Err(BackupError::Validation(format!(
                "unsupported backup mode for mongoDB: {}",
                params.mode
            )));
        }
        if params.mode == BackupMode::Pitr && params.data_model != DataModel::Logical {
            return Err(BackupError::IncompatibleDataModel(
                "PITR is only supported for logical backups".to_string(),
            ));
        }

        Ok(Self {
            id: String::new(),
            params,
        })
    }

    pub(crate) fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }
}

#[async_trait]
impl Task for MongoDbBackupTask {
    async fn run(&self, cancel: CancellationToken, scheduler: &Scheduler) -> Result<()> {
        perform_backup(&self.id, &self.params, cancel, scheduler).await
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn task_type(&self) -> ScheduledTaskType {
        ScheduledTaskType::MongoDbBackup
    }

    fn data(&self) -> ScheduledTaskData {
        ScheduledTaskData::MongoDbBackup(self.params.clone())
    }
}

/// 由持久化载荷重建任务，构造校验同样生效
pub fn task_from_data(id: &str, data: &ScheduledTaskData) -> Result<Box<dyn Task>> {
    match data {
        ScheduledTaskData::MySqlBackup(params) => {
            Ok(Box::new(MySqlBackupTask::new(params.clone())?.with_id(id)))
        }
        ScheduledTaskData::MongoDbBackup(params) => {
            Ok(Box::new(MongoDbBackupTask::new(params.clone())?.with_id(id)))
        }
    }
}
