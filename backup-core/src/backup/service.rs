//! 备份编排服务：校验请求，组装计划任务，委托执行器并统一转换错误

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::backup::executor::{BackupExecutor, ExecutorError, PerformBackupParams};
use crate::backup::pitr::PitrTimerangeInspector;
use crate::backup::types::{
    ArtifactInfo, ChangeScheduledBackupRequest, GetLogsRequest, GetLogsResponse, LogChunk,
    PitrTimerange, RestoreBackupRequest, RestoreBackupResponse, ScheduleBackupRequest,
    ScheduleBackupResponse, ScheduledBackup, StartBackupRequest, StartBackupResponse,
};
use crate::backup::validation::{self, BoundsMessage};
use crate::config::AppConfig;
use crate::db::{Database, artifacts, inventory, jobs, scheduled_tasks};
use crate::error::{BackupError, Code, ErrorCode, Result, Status};
use crate::models::{
    Artifact, ArtifactFilters, BackupCompression, BackupLocation, BackupMode, BackupTaskDataChange,
    ChangeScheduledTaskParams, DataModel, JobType, ScheduledTask, ScheduledTaskData,
    ScheduledTaskType, ScheduledTasksFilter, Service, ServiceType,
};
use crate::scheduler::preconditions;
use crate::scheduler::{AddParams, BackupTaskParams, MongoDbBackupTask, MySqlBackupTask, Scheduler, Task};

/// 备份编排服务
pub struct BackupService {
    db: Database,
    scheduler: Arc<Scheduler>,
    executor: Arc<dyn BackupExecutor>,
    inspector: Arc<dyn PitrTimerangeInspector>,
    max_retries: u32,
    max_retry_interval: Duration,
}

impl BackupService {
    pub fn new(
        scheduler: Arc<Scheduler>,
        inspector: Arc<dyn PitrTimerangeInspector>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db: scheduler.db().clone(),
            executor: scheduler.backup_executor(),
            scheduler,
            inspector,
            max_retries: config.backup.max_retries,
            max_retry_interval: config.max_retry_interval(),
        }
    }

    /// 按配置连接数据库并创建调度器与服务；调度循环需调用方通过 `scheduler().run()` 启动
    pub async fn from_config(
        config: &AppConfig,
        executor: Arc<dyn BackupExecutor>,
        inspector: Arc<dyn PitrTimerangeInspector>,
    ) -> Result<Self> {
        let db = if config.is_memory_database() {
            Database::connect_memory().await?
        } else {
            Database::connect(config.get_db_path()).await?
        };
        let scheduler = Scheduler::new(db, executor, config.tick_interval());
        info!(db = ?config.get_db_path(), "备份服务已初始化");
        Ok(Self::new(scheduler, inspector, config))
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    fn check_retries(&self, retries: u32, retry_interval: Duration) -> Result<()> {
        validation::check_retry_bounds(
            Some(retries),
            Some(retry_interval),
            self.max_retries,
            self.max_retry_interval,
            BoundsMessage::Sentence,
        )
    }

    /// 立即执行一次快照备份，返回产物 ID
    #[instrument(skip(self, cancel, req), fields(service_id = %req.service_id))]
    pub async fn start_backup(
        &self,
        cancel: CancellationToken,
        req: StartBackupRequest,
    ) -> Result<StartBackupResponse> {
        async move {
            self.check_retries(req.retries, req.retry_interval)?;
            validation::is_name_safe(&req.name)?;
            validation::is_folder_safe(&req.folder)?;

            let data_model = self
                .db
                .read(|conn| {
                    let service = inventory::find_service_by_id(conn, &req.service_id)?;
                    match service.service_type {
                        ServiceType::MySql => {
                            check_compression(req.compression, service.service_type)?;
                            if req.data_model != DataModel::Physical {
                                return Err(Status::invalid_argument(
                                    "the only supported data model for mySQL is physical",
                                )
                                .into());
                            }
                            Ok(req.data_model)
                        }
                        ServiceType::MongoDb => {
                            require_cluster(&service)?;
                            check_compression(req.compression, service.service_type)?;
                            preconditions::check_mongo_cluster(
                                conn,
                                &service.cluster,
                                BackupMode::Snapshot,
                                None,
                            )?;
                            Ok(req.data_model)
                        }
                        other => Err(unimplemented_service(other)),
                    }
                })
                .await?;

            let artifact_id = self
                .executor
                .perform_backup(
                    cancel,
                    PerformBackupParams {
                        service_id: req.service_id,
                        location_id: req.location_id,
                        name: req.name,
                        schedule_id: None,
                        data_model,
                        mode: BackupMode::Snapshot,
                        retries: req.retries,
                        retry_interval: req.retry_interval,
                        folder: req.folder,
                        compression: req.compression,
                    },
                )
                .await?;

            info!(artifact_id = %artifact_id, "备份已开始");
            Ok(StartBackupResponse { artifact_id })
        }
        .await
        .map_err(convert_error)
    }

    /// 恢复前先停用该服务的所有计划备份
    #[instrument(skip(self, cancel, req), fields(service_id = %req.service_id, artifact_id = %req.artifact_id))]
    pub async fn restore_backup(
        &self,
        cancel: CancellationToken,
        req: RestoreBackupRequest,
    ) -> Result<RestoreBackupResponse> {
        async move {
            let tasks = self
                .db
                .read(|conn| {
                    scheduled_tasks::find_scheduled_tasks(
                        conn,
                        &ScheduledTasksFilter {
                            service_id: Some(req.service_id.clone()),
                            disabled: Some(false),
                            ..Default::default()
                        },
                    )
                })
                .await?;

            for task in tasks {
                info!(task_id = %task.id, "恢复前停用计划备份");
                self.change_scheduled_backup(
                    cancel.clone(),
                    ChangeScheduledBackupRequest {
                        scheduled_backup_id: task.id,
                        enabled: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
            }

            let restore_id = self
                .executor
                .restore_backup(cancel, &req.service_id, &req.artifact_id, req.pitr_timestamp)
                .await?;

            info!(restore_id = %restore_id, "恢复已开始");
            Ok(RestoreBackupResponse { restore_id })
        }
        .await
        .map_err(convert_error)
    }

    /// 创建计划备份
    #[instrument(skip(self, req), fields(service_id = %req.service_id, mode = %req.mode))]
    pub async fn schedule_backup(
        &self,
        req: ScheduleBackupRequest,
    ) -> Result<ScheduleBackupResponse> {
        async move {
            self.check_retries(req.retries, req.retry_interval)?;
            validation::is_name_safe(&req.name)?;
            validation::is_folder_safe(&req.folder)?;

            let service = self
                .db
                .read(|conn| {
                    let service = inventory::find_service_by_id(conn, &req.service_id)?;
                    inventory::find_location_by_id(conn, &req.location_id)?;
                    Ok(service)
                })
                .await?;

            let params = BackupTaskParams {
                service_id: service.service_id.clone(),
                cluster_name: service.cluster.clone(),
                location_id: req.location_id,
                name: req.name,
                description: req.description,
                data_model: req.data_model,
                mode: req.mode,
                retention: req.retention,
                retries: req.retries,
                retry_interval: req.retry_interval,
                folder: req.folder,
                compression: req.compression,
            };

            let task: Box<dyn Task> = match service.service_type {
                ServiceType::MySql => {
                    check_compression(params.compression, service.service_type)?;
                    Box::new(MySqlBackupTask::new(params).map_err(|e| task_error("mySQL", e))?)
                }
                ServiceType::MongoDb => {
                    require_cluster(&service)?;
                    check_compression(params.compression, service.service_type)?;
                    Box::new(MongoDbBackupTask::new(params).map_err(|e| task_error("mongoDB", e))?)
                }
                other => return Err(unimplemented_service(other)),
            };

            let row = self
                .scheduler
                .add(
                    task.as_ref(),
                    AddParams {
                        cron_expression: req.cron_expression,
                        disabled: !req.enabled,
                        start_at: req.start_time.filter(|t| t.timestamp() != 0),
                    },
                )
                .await?;

            Ok(ScheduleBackupResponse {
                scheduled_backup_id: row.id,
            })
        }
        .await
        .map_err(convert_error)
    }

    /// 列出全部计划备份；关联的服务或位置缺失的记录跳过
    pub async fn list_scheduled_backups(&self) -> Result<Vec<ScheduledBackup>> {
        async {
            let (tasks, services, locations) = self
                .db
                .read(|conn| {
                    let tasks = scheduled_tasks::find_scheduled_tasks(
                        conn,
                        &ScheduledTasksFilter {
                            types: vec![
                                ScheduledTaskType::MySqlBackup,
                                ScheduledTaskType::MongoDbBackup,
                            ],
                            ..Default::default()
                        },
                    )?;
                    let service_ids: Vec<String> = tasks
                        .iter()
                        .map(|t| t.data.common().service_id.clone())
                        .collect();
                    let location_ids: Vec<String> = tasks
                        .iter()
                        .map(|t| t.data.common().location_id.clone())
                        .collect();
                    let services = inventory::find_services_by_ids(conn, &service_ids)?;
                    let locations = inventory::find_locations_by_ids(conn, &location_ids)?;
                    Ok((tasks, services, locations))
                })
                .await?;

            let services = index_services(&services);
            let locations = index_locations(&locations);

            let mut backups = Vec::with_capacity(tasks.len());
            for task in &tasks {
                match convert_task(task, &services, &locations) {
                    Ok(backup) => backups.push(backup),
                    Err(e) => warn!(task_id = %task.id, error = %e, "计划任务转换失败，已跳过"),
                }
            }
            Ok(backups)
        }
        .await
        .map_err(convert_error)
    }

    /// 修改计划备份，只更新请求中给出的字段
    ///
    /// 停用 MongoDB PITR 计划时，在提交后尝试关闭集群 PITR，失败只记录日志。
    #[instrument(skip(self, cancel, req), fields(task_id = %req.scheduled_backup_id))]
    pub async fn change_scheduled_backup(
        &self,
        cancel: CancellationToken,
        req: ChangeScheduledBackupRequest,
    ) -> Result<()> {
        async move {
            if let Some(name) = &req.name {
                validation::is_name_safe(name)?;
            }
            validation::check_retry_bounds(
                req.retries,
                req.retry_interval,
                self.max_retries,
                self.max_retry_interval,
                BoundsMessage::Lowercase,
            )?;

            let row = self
                .scheduler
                .update(
                    &req.scheduled_backup_id,
                    ChangeScheduledTaskParams {
                        data_change: BackupTaskDataChange {
                            name: req.name,
                            description: req.description,
                            retention: req.retention,
                            retries: req.retries,
                            retry_interval: req.retry_interval,
                        },
                        cron_expression: req.cron_expression,
                        disable: req.enabled.map(|enabled| !enabled),
                        ..Default::default()
                    },
                )
                .await?;

            if req.enabled == Some(false) && is_mongo_pitr(&row.data) {
                self.disable_pitr(cancel, &row.data.common().service_id)
                    .await;
            }
            Ok(())
        }
        .await
        .map_err(convert_error)
    }

    /// 删除计划备份，其产物保留但解除关联
    #[instrument(skip(self, cancel))]
    pub async fn remove_scheduled_backup(&self, cancel: CancellationToken, id: &str) -> Result<()> {
        async move {
            let task = self
                .db
                .read(|conn| scheduled_tasks::find_scheduled_task_by_id(conn, id))
                .await?;
            let disable_pitr = !task.disabled && is_mongo_pitr(&task.data);

            self.scheduler.remove(id).await?;

            if disable_pitr {
                self.disable_pitr(cancel, &task.data.common().service_id)
                    .await;
            }
            Ok(())
        }
        .await
        .map_err(convert_error)
    }

    async fn disable_pitr(&self, cancel: CancellationToken, service_id: &str) {
        match self.executor.switch_mongo_pitr(cancel, service_id, false).await {
            Ok(()) => info!(service_id = %service_id, "已关闭 PITR"),
            Err(e) => error!(service_id = %service_id, error = %e, "关闭 PITR 失败"),
        }
    }

    /// 读取产物关联的备份或恢复作业的日志
    pub async fn get_logs(&self, req: GetLogsRequest) -> Result<GetLogsResponse> {
        async {
            let (job_count, logs) = self
                .db
                .read(|conn| {
                    let related: Vec<_> = jobs::find_jobs_by_artifact(conn, &req.artifact_id)?
                        .into_iter()
                        .filter(|j| {
                            matches!(
                                j.job_type,
                                JobType::MySqlBackup | JobType::MongoDbBackup | JobType::MongoDbRestore
                            )
                        })
                        .collect();
                    let Some(job) = related.first() else {
                        return Ok((0, Vec::new()));
                    };
                    let limit = (req.limit > 0).then_some(req.limit);
                    let logs = jobs::find_job_logs(conn, &job.id, req.offset, limit)?;
                    Ok((related.len(), logs))
                })
                .await?;

            if job_count == 0 {
                return Err(Status::not_found("Job related to artifact was not found.").into());
            }
            if job_count > 1 {
                warn!(artifact_id = %req.artifact_id, jobs = job_count, "产物关联了多个作业");
            }

            let mut response = GetLogsResponse::default();
            for log in logs {
                if log.last_chunk {
                    response.end = true;
                    break;
                }
                response.logs.push(LogChunk {
                    chunk_id: log.chunk_id,
                    data: log.data,
                });
            }
            Ok(response)
        }
        .await
        .map_err(convert_error)
    }

    /// 列出全部备份产物
    pub async fn list_artifacts(&self) -> Result<Vec<ArtifactInfo>> {
        async {
            let (found, services, locations) = self
                .db
                .read(|conn| {
                    let found = artifacts::find_artifacts(conn, &ArtifactFilters::default())?;
                    let service_ids: Vec<String> =
                        found.iter().map(|a| a.service_id.clone()).collect();
                    let location_ids: Vec<String> =
                        found.iter().map(|a| a.location_id.clone()).collect();
                    let services = inventory::find_services_by_ids(conn, &service_ids)?;
                    let locations = inventory::find_locations_by_ids(conn, &location_ids)?;
                    Ok((found, services, locations))
                })
                .await?;

            let services = index_services(&services);
            let locations = index_locations(&locations);

            let mut result = Vec::with_capacity(found.len());
            for artifact in found {
                match convert_artifact(artifact, &services, &locations) {
                    Ok(info) => result.push(info),
                    Err(e) => warn!(error = %e, "备份产物转换失败，已跳过"),
                }
            }
            Ok(result)
        }
        .await
        .map_err(convert_error)
    }

    /// 列出 PITR 产物可恢复的时间段
    #[instrument(skip(self, cancel))]
    pub async fn list_pitr_timeranges(
        &self,
        cancel: CancellationToken,
        artifact_id: &str,
    ) -> Result<Vec<PitrTimerange>> {
        async move {
            let artifact = self
                .db
                .read(|conn| match artifacts::find_artifact_by_id(conn, artifact_id) {
                    Err(BackupError::NotFound(_)) => Err(Status::not_found(format!(
                        "Artifact with ID '{artifact_id}' not found."
                    ))
                    .into()),
                    other => other,
                })
                .await?;

            if artifact.mode != BackupMode::Pitr {
                return Err(Status::failed_precondition("Artifact is not a PITR artifact.").into());
            }
            if artifact.is_sharded_cluster {
                return Err(Status::failed_precondition(
                    "Getting PITR timeranges is not supported for sharded cluster artifacts.",
                )
                .into());
            }

            let location = self
                .db
                .read(|conn| inventory::find_location_by_id(conn, &artifact.location_id))
                .await?;
            let storage = location.storage()?;

            let timelines = self
                .inspector
                .list_pitr_timeranges(cancel, &storage, &location, &artifact)
                .await?;

            timelines
                .iter()
                .map(|t| {
                    Ok(PitrTimerange {
                        start_timestamp: unix_timestamp(t.start)?,
                        end_timestamp: unix_timestamp(t.end)?,
                    })
                })
                .collect()
        }
        .await
        .map_err(convert_error)
    }

    /// 服务所属引擎支持的压缩方式
    pub async fn list_service_compression(&self, service_id: &str) -> Result<Vec<BackupCompression>> {
        async move {
            let service = self
                .db
                .read(|conn| inventory::find_service_by_id(conn, service_id))
                .await?;

            BackupCompression::supported_for(service.service_type)
                .map(<[BackupCompression]>::to_vec)
                .ok_or_else(|| {
                    Status::unimplemented(format!(
                        "backup compression is not yet supported for service type: {}",
                        service.service_type
                    ))
                    .into()
                })
        }
        .await
        .map_err(convert_error)
    }
}

/// 把领域错误转换为对外状态；已是状态的错误和未知错误原样返回
pub fn convert_error(err: BackupError) -> BackupError {
    let message = err.to_string();
    let status = match &err {
        BackupError::Executor(executor_err) => match executor_err {
            ExecutorError::XtrabackupNotInstalled => Status::failed_precondition(message)
                .with_error_code(ErrorCode::XtrabackupNotInstalled),
            ExecutorError::InvalidXtrabackup(_) => {
                Status::failed_precondition(message).with_error_code(ErrorCode::InvalidXtrabackup)
            }
            ExecutorError::IncompatibleXtrabackup(_) => Status::failed_precondition(message)
                .with_error_code(ErrorCode::IncompatibleXtrabackup),
            ExecutorError::IncompatibleTargetMySql(_) => Status::failed_precondition(message)
                .with_error_code(ErrorCode::IncompatibleTargetMysql),
            ExecutorError::IncompatibleTargetMongoDb(_) => Status::failed_precondition(message)
                .with_error_code(ErrorCode::IncompatibleTargetMongodb),
            ExecutorError::TimestampOutOfRange(_) => Status::new(Code::OutOfRange, message),
            ExecutorError::AgentNotSupported(_)
            | ExecutorError::AnotherOperationInProgress(_)
            | ExecutorError::ArtifactNotReady(_)
            | ExecutorError::IncompatiblePbm(_)
            | ExecutorError::IncompatibleLocationType(_)
            | ExecutorError::IncompatibleService(_)
            | ExecutorError::IncompatibleArtifactMode(_) => Status::failed_precondition(message),
            ExecutorError::Failed(_) => return err,
        },
        BackupError::NotFound(_) => Status::not_found(message),
        BackupError::AlreadyExists(_) => Status::new(Code::AlreadyExists, message),
        BackupError::LocationFolderPairAlreadyUsed
        | BackupError::ScheduleOverlap
        | BackupError::IncompatibleDataModel(_) => Status::failed_precondition(message),
        BackupError::Validation(_) | BackupError::InvalidArgument(_) | BackupError::Cron(_) => {
            Status::invalid_argument(message)
        }
        _ => return err,
    };
    status.into()
}

fn check_compression(compression: BackupCompression, service_type: ServiceType) -> Result<()> {
    compression
        .validate_for_service_type(service_type)
        .map_err(|e| Status::invalid_argument(format!("Compression validation failed: {e}")).into())
}

fn require_cluster(service: &Service) -> Result<()> {
    if service.cluster.is_empty() {
        return Err(Status::failed_precondition(format!(
            "Service {} must be a member of a cluster",
            service.service_name
        ))
        .into());
    }
    Ok(())
}

fn unimplemented_service(service_type: ServiceType) -> BackupError {
    Status::unimplemented(format!("Unimplemented service: {service_type}.")).into()
}

/// 任务构造失败：数据模型不兼容属于前置条件错误，其余为参数错误
fn task_error(engine: &str, err: BackupError) -> BackupError {
    let message = format!("Can't create {engine} backup task: {err}");
    match err {
        BackupError::IncompatibleDataModel(_) => Status::failed_precondition(message).into(),
        _ => Status::invalid_argument(message).into(),
    }
}

fn is_mongo_pitr(data: &ScheduledTaskData) -> bool {
    matches!(data, ScheduledTaskData::MongoDbBackup(common) if common.mode == BackupMode::Pitr)
}

fn unix_timestamp(secs: u32) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(secs), 0)
        .ok_or_else(|| BackupError::custom(format!("无效的时间戳: {secs}")))
}

fn index_services(services: &[Service]) -> HashMap<&str, &Service> {
    services.iter().map(|s| (s.service_id.as_str(), s)).collect()
}

fn index_locations(locations: &[BackupLocation]) -> HashMap<&str, &BackupLocation> {
    locations.iter().map(|l| (l.id.as_str(), l)).collect()
}

fn convert_task(
    task: &ScheduledTask,
    services: &HashMap<&str, &Service>,
    locations: &HashMap<&str, &BackupLocation>,
) -> Result<ScheduledBackup> {
    let common = task.data.common();
    let service = services
        .get(common.service_id.as_str())
        .ok_or_else(|| BackupError::NotFound(format!("service with id '{}'", common.service_id)))?;
    let location = locations.get(common.location_id.as_str()).ok_or_else(|| {
        BackupError::NotFound(format!("backup location with id '{}'", common.location_id))
    })?;

    Ok(ScheduledBackup {
        scheduled_backup_id: task.id.clone(),
        service_id: service.service_id.clone(),
        service_name: service.service_name.clone(),
        location_id: location.id.clone(),
        location_name: location.name.clone(),
        folder: common.folder.clone(),
        cron_expression: task.cron_expression.clone(),
        start_time: task.start_at,
        name: common.name.clone(),
        description: common.description.clone(),
        enabled: !task.disabled,
        retries: common.retries,
        retry_interval: common.retry_interval,
        data_model: common.data_model,
        mode: common.mode,
        vendor: service.service_type.to_string(),
        last_run: task.last_run,
        next_run: task.next_run,
        retention: common.retention,
        compression: common.compression,
        running: task.running,
        error: task.error.clone(),
    })
}

fn convert_artifact(
    artifact: Artifact,
    services: &HashMap<&str, &Service>,
    locations: &HashMap<&str, &BackupLocation>,
) -> Result<ArtifactInfo> {
    let service = services.get(artifact.service_id.as_str()).ok_or_else(|| {
        BackupError::NotFound(format!("service with id '{}'", artifact.service_id))
    })?;
    let location = locations.get(artifact.location_id.as_str()).ok_or_else(|| {
        BackupError::NotFound(format!("backup location with id '{}'", artifact.location_id))
    })?;

    Ok(ArtifactInfo {
        service_name: service.service_name.clone(),
        location_name: location.name.clone(),
        artifact_id: artifact.id,
        name: artifact.name,
        vendor: artifact.vendor,
        location_id: artifact.location_id,
        service_id: artifact.service_id,
        data_model: artifact.data_model,
        mode: artifact.mode,
        status: artifact.status,
        created_at: artifact.created_at,
        is_sharded_cluster: artifact.is_sharded_cluster,
        folder: artifact.folder,
        compression: artifact.compression,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::pitr::Timeline;
    use crate::models::{BackupStatus, CreateArtifactParams, JobLog};
    use crate::testing::{FakeExecutor, FakeInspector, seed_inventory};

    struct Harness {
        service: BackupService,
        executor: Arc<FakeExecutor>,
        db: Database,
    }

    async fn harness() -> Harness {
        harness_with(Vec::new()).await
    }

    async fn harness_with(timelines: Vec<Timeline>) -> Harness {
        let db = Database::connect_memory().await.unwrap();
        seed_inventory(&db, "mysql-1", ServiceType::MySql, "", "loc-1").await;
        seed_inventory(&db, "mongo-1", ServiceType::MongoDb, "rs0", "loc-1").await;
        seed_inventory(&db, "mongo-solo", ServiceType::MongoDb, "", "loc-1").await;
        seed_inventory(&db, "pg-1", ServiceType::PostgreSql, "", "loc-1").await;

        let (executor, _started) = FakeExecutor::new();
        let executor = Arc::new(executor);
        let scheduler = Scheduler::new(db.clone(), executor.clone(), Duration::from_millis(50));
        let service = BackupService::new(
            scheduler,
            Arc::new(FakeInspector { timelines }),
            &AppConfig::default(),
        );
        Harness {
            service,
            executor,
            db,
        }
    }

    fn default_data_model(service_id: &str) -> DataModel {
        if service_id.starts_with("mysql") {
            DataModel::Physical
        } else {
            DataModel::Logical
        }
    }

    fn start_request(service_id: &str) -> StartBackupRequest {
        StartBackupRequest {
            service_id: service_id.into(),
            location_id: "loc-1".into(),
            name: "manual".into(),
            retries: 0,
            retry_interval: Duration::ZERO,
            data_model: default_data_model(service_id),
            folder: String::new(),
            compression: BackupCompression::Default,
        }
    }

    fn schedule_request(service_id: &str, mode: BackupMode) -> ScheduleBackupRequest {
        ScheduleBackupRequest {
            service_id: service_id.into(),
            location_id: "loc-1".into(),
            folder: String::new(),
            cron_expression: "0 3 * * *".into(),
            start_time: None,
            name: "nightly".into(),
            description: "every night".into(),
            enabled: true,
            retries: 2,
            retry_interval: Duration::from_secs(30),
            data_model: default_data_model(service_id),
            mode,
            retention: 7,
            compression: BackupCompression::Default,
        }
    }

    fn status_of(err: BackupError) -> Status {
        err.as_status().cloned().unwrap_or_else(|| panic!("not a status: {err}"))
    }

    async fn insert_artifact(db: &Database, mode: BackupMode, sharded: bool) -> String {
        db.transaction(move |conn| {
            artifacts::create_artifact(
                conn,
                CreateArtifactParams {
                    name: "artifact".into(),
                    vendor: "mongodb".into(),
                    service_id: "mongo-1".into(),
                    location_id: "loc-1".into(),
                    data_model: DataModel::Logical,
                    mode,
                    status: BackupStatus::Success,
                    compression: BackupCompression::Default,
                    schedule_id: None,
                    folder: String::new(),
                    is_sharded_cluster: sharded,
                },
            )
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_start_backup_validation() {
        let h = harness().await;

        let mut req = start_request("mysql-1");
        req.name = "normal/name".into();
        let status = status_of(h.service.start_backup(CancellationToken::new(), req).await.unwrap_err());
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(
            status.message,
            "Backup name can contain only dots, colons, letters, digits, underscores and dashes."
        );

        let mut req = start_request("mysql-1");
        req.retries = 11;
        let status = status_of(h.service.start_backup(CancellationToken::new(), req).await.unwrap_err());
        assert_eq!(status.message, "Exceeded max retries 10.");

        let mut req = start_request("mysql-1");
        req.retry_interval = Duration::from_secs(8 * 3600 + 1);
        let status = status_of(h.service.start_backup(CancellationToken::new(), req).await.unwrap_err());
        assert_eq!(status.message, "Exceeded max retry interval 8h0m0s.");

        let mut req = start_request("mysql-1");
        req.folder = "../up".into();
        let status = status_of(h.service.start_backup(CancellationToken::new(), req).await.unwrap_err());
        assert_eq!(status.message, "Specified folder refers to a parent directory.");

        let mut req = start_request("mysql-1");
        req.compression = BackupCompression::Gzip;
        let status = status_of(h.service.start_backup(CancellationToken::new(), req).await.unwrap_err());
        assert_eq!(status.code, Code::InvalidArgument);
        assert!(status.message.starts_with("Compression validation failed:"));

        let status = status_of(
            h.service
                .start_backup(CancellationToken::new(), start_request("missing"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::NotFound);

        assert!(h.executor.backups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_backup_delegates_to_executor() {
        let h = harness().await;

        let response = h
            .service
            .start_backup(CancellationToken::new(), start_request("mysql-1"))
            .await
            .unwrap();
        assert!(!response.artifact_id.is_empty());

        let response = h
            .service
            .start_backup(CancellationToken::new(), start_request("mongo-1"))
            .await
            .unwrap();
        assert!(!response.artifact_id.is_empty());

        let backups = h.executor.backups.lock().unwrap().clone();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[1].data_model, DataModel::Logical);
        assert!(backups.iter().all(|b| b.mode == BackupMode::Snapshot && b.schedule_id.is_none()));
    }

    #[tokio::test]
    async fn test_mysql_rejects_logical_data_model() {
        let h = harness().await;

        let mut req = start_request("mysql-1");
        req.data_model = DataModel::Logical;
        let status = status_of(h.service.start_backup(CancellationToken::new(), req).await.unwrap_err());
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(status.message, "the only supported data model for mySQL is physical");
        assert!(h.executor.backups.lock().unwrap().is_empty());

        let mut req = schedule_request("mysql-1", BackupMode::Snapshot);
        req.data_model = DataModel::Logical;
        let status = status_of(h.service.schedule_backup(req).await.unwrap_err());
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(
            status.message,
            "Can't create mySQL backup task: unsupported backup data model for mySQL: logical"
        );
        assert!(h.service.list_scheduled_backups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_backup_service_checks() {
        let h = harness().await;

        let status = status_of(
            h.service
                .start_backup(CancellationToken::new(), start_request("mongo-solo"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);
        assert_eq!(status.message, "Service mongo-solo-name must be a member of a cluster");

        let status = status_of(
            h.service
                .start_backup(CancellationToken::new(), start_request("pg-1"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::Unimplemented);

        // 集群已有启用的 PITR 计划时不能做快照
        h.service
            .schedule_backup(schedule_request("mongo-1", BackupMode::Pitr))
            .await
            .unwrap();
        let status = status_of(
            h.service
                .start_backup(CancellationToken::new(), start_request("mongo-1"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);
        assert_eq!(
            status.message,
            "A snapshot backup for cluster 'rs0' can be done only if there is no enabled PITR backup."
        );
    }

    #[tokio::test]
    async fn test_start_backup_executor_errors() {
        let h = harness().await;

        h.executor.fail_next(ExecutorError::XtrabackupNotInstalled);
        let status = status_of(
            h.service
                .start_backup(CancellationToken::new(), start_request("mysql-1"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);
        assert_eq!(status.error_code, Some(ErrorCode::XtrabackupNotInstalled));

        h.executor
            .fail_next(ExecutorError::AnotherOperationInProgress("pbm busy".into()));
        let status = status_of(
            h.service
                .start_backup(CancellationToken::new(), start_request("mongo-1"))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);
        assert_eq!(status.error_code, None);
    }

    #[tokio::test]
    async fn test_schedule_and_list() {
        let h = harness().await;

        let id = h
            .service
            .schedule_backup(schedule_request("mysql-1", BackupMode::Snapshot))
            .await
            .unwrap()
            .scheduled_backup_id;
        assert!(h.service.scheduler().is_registered(&id));

        let mut disabled = schedule_request("mongo-1", BackupMode::Snapshot);
        disabled.enabled = false;
        disabled.folder = "mongo".into();
        disabled.start_time = DateTime::from_timestamp(0, 0);
        let mongo_id = h
            .service
            .schedule_backup(disabled)
            .await
            .unwrap()
            .scheduled_backup_id;

        let listed = h.service.list_scheduled_backups().await.unwrap();
        assert_eq!(listed.len(), 2);

        let mysql = listed.iter().find(|b| b.scheduled_backup_id == id).unwrap();
        assert_eq!(mysql.service_name, "mysql-1-name");
        assert_eq!(mysql.location_name, "loc-1-name");
        assert_eq!(mysql.vendor, "mysql");
        assert_eq!(mysql.data_model, DataModel::Physical);
        assert!(mysql.enabled);
        assert!(mysql.next_run.is_some());
        assert_eq!(mysql.retention, 7);

        let mongo = listed.iter().find(|b| b.scheduled_backup_id == mongo_id).unwrap();
        assert!(!mongo.enabled);
        assert_eq!(mongo.start_time, None);
        assert_eq!(mongo.next_run, None);
    }

    #[tokio::test]
    async fn test_schedule_backup_errors() {
        let h = harness().await;

        let status = status_of(
            h.service
                .schedule_backup(schedule_request("mongo-solo", BackupMode::Snapshot))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);
        assert_eq!(status.message, "Service mongo-solo-name must be a member of a cluster");

        let status = status_of(
            h.service
                .schedule_backup(schedule_request("pg-1", BackupMode::Snapshot))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::Unimplemented);
        assert_eq!(status.message, "Unimplemented service: postgresql.");

        let mut req = schedule_request("mongo-1", BackupMode::Pitr);
        req.data_model = DataModel::Physical;
        let status = status_of(h.service.schedule_backup(req).await.unwrap_err());
        assert_eq!(status.code, Code::FailedPrecondition);
        assert_eq!(
            status.message,
            "Can't create mongoDB backup task: PITR is only supported for logical backups: the specified backup model is not compatible with other parameters"
        );

        let status = status_of(
            h.service
                .schedule_backup(schedule_request("mysql-1", BackupMode::Pitr))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(
            status.message,
            "Can't create mySQL backup task: unsupported backup mode for mySQL: pitr"
        );

        let mut req = schedule_request("mysql-1", BackupMode::Snapshot);
        req.cron_expression = "not a cron".into();
        let status = status_of(h.service.schedule_backup(req).await.unwrap_err());
        assert_eq!(status.code, Code::InvalidArgument);

        let mut req = schedule_request("mysql-1", BackupMode::Snapshot);
        req.location_id = "loc-missing".into();
        let status = status_of(h.service.schedule_backup(req).await.unwrap_err());
        assert_eq!(status.code, Code::NotFound);

        // 同一服务同一目录不能有两个启用的计划
        h.service
            .schedule_backup(schedule_request("mysql-1", BackupMode::Snapshot))
            .await
            .unwrap();
        let status = status_of(
            h.service
                .schedule_backup(schedule_request("mysql-1", BackupMode::Snapshot))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);

        // 其他服务不能使用同一目录
        let status = status_of(
            h.service
                .schedule_backup(schedule_request("mongo-1", BackupMode::Snapshot))
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_change_scheduled_backup() {
        let h = harness().await;
        let id = h
            .service
            .schedule_backup(schedule_request("mongo-1", BackupMode::Pitr))
            .await
            .unwrap()
            .scheduled_backup_id;

        h.service
            .change_scheduled_backup(
                CancellationToken::new(),
                ChangeScheduledBackupRequest {
                    scheduled_backup_id: id.clone(),
                    name: Some("renamed".into()),
                    retention: Some(3),
                    cron_expression: Some("0 4 * * *".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let listed = h.service.list_scheduled_backups().await.unwrap();
        assert_eq!(listed[0].name, "renamed");
        assert_eq!(listed[0].retention, 3);
        assert_eq!(listed[0].cron_expression, "0 4 * * *");
        assert_eq!(listed[0].description, "every night");
        assert!(h.executor.pitr_switches.lock().unwrap().is_empty());

        let status = status_of(
            h.service
                .change_scheduled_backup(
                    CancellationToken::new(),
                    ChangeScheduledBackupRequest {
                        scheduled_backup_id: id.clone(),
                        retries: Some(11),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err(),
        );
        assert_eq!(status.message, "exceeded max retries 10");

        let status = status_of(
            h.service
                .change_scheduled_backup(
                    CancellationToken::new(),
                    ChangeScheduledBackupRequest {
                        scheduled_backup_id: id.clone(),
                        retry_interval: Some(Duration::from_secs(9 * 3600)),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err(),
        );
        assert_eq!(status.message, "exceeded max retry interval 8h0m0s");

        // 停用 PITR 计划时关闭集群 PITR
        h.service
            .change_scheduled_backup(
                CancellationToken::new(),
                ChangeScheduledBackupRequest {
                    scheduled_backup_id: id.clone(),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!h.service.scheduler().is_registered(&id));
        assert_eq!(
            h.executor.pitr_switches.lock().unwrap().as_slice(),
            &[("mongo-1".to_string(), false)]
        );

        let status = status_of(
            h.service
                .change_scheduled_backup(
                    CancellationToken::new(),
                    ChangeScheduledBackupRequest {
                        scheduled_backup_id: "missing".into(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_changes_keep_both_fields() {
        let h = harness().await;
        let id = h
            .service
            .schedule_backup(schedule_request("mysql-1", BackupMode::Snapshot))
            .await
            .unwrap()
            .scheduled_backup_id;

        let rename = h.service.change_scheduled_backup(
            CancellationToken::new(),
            ChangeScheduledBackupRequest {
                scheduled_backup_id: id.clone(),
                name: Some("renamed".into()),
                ..Default::default()
            },
        );
        let retain = h.service.change_scheduled_backup(
            CancellationToken::new(),
            ChangeScheduledBackupRequest {
                scheduled_backup_id: id.clone(),
                retention: Some(30),
                ..Default::default()
            },
        );
        let (renamed, retained) = tokio::join!(rename, retain);
        renamed.unwrap();
        retained.unwrap();

        let listed = h.service.list_scheduled_backups().await.unwrap();
        assert_eq!(listed[0].name, "renamed");
        assert_eq!(listed[0].retention, 30);
        assert_eq!(listed[0].retries, 2);
    }

    #[tokio::test]
    async fn test_list_skips_undecodable_schedules() {
        let h = harness().await;
        let good = h
            .service
            .schedule_backup(schedule_request("mysql-1", BackupMode::Snapshot))
            .await
            .unwrap()
            .scheduled_backup_id;
        let mut req = schedule_request("mongo-1", BackupMode::Snapshot);
        req.folder = "mongo".into();
        let bad = h.service.schedule_backup(req).await.unwrap().scheduled_backup_id;

        h.db.transaction(move |conn| {
            conn.execute("UPDATE scheduled_tasks SET data = '{broken' WHERE id = ?", [&bad])?;
            Ok(())
        })
        .await
        .unwrap();

        let listed = h.service.list_scheduled_backups().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].scheduled_backup_id, good);
    }

    #[tokio::test]
    async fn test_remove_scheduled_backup() {
        let h = harness().await;
        let pitr_id = h
            .service
            .schedule_backup(schedule_request("mongo-1", BackupMode::Pitr))
            .await
            .unwrap()
            .scheduled_backup_id;
        let err = h
            .service
            .schedule_backup(schedule_request("mysql-1", BackupMode::Snapshot))
            .await
            .unwrap_err();
        // 同一位置的默认目录已被 MongoDB 计划占用
        assert_eq!(status_of(err).code, Code::FailedPrecondition);

        h.service
            .remove_scheduled_backup(CancellationToken::new(), &pitr_id)
            .await
            .unwrap();
        assert!(!h.service.scheduler().is_registered(&pitr_id));
        assert_eq!(
            h.executor.pitr_switches.lock().unwrap().as_slice(),
            &[("mongo-1".to_string(), false)]
        );
        assert!(h.service.list_scheduled_backups().await.unwrap().is_empty());

        let status = status_of(
            h.service
                .remove_scheduled_backup(CancellationToken::new(), &pitr_id)
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_pitr_disable_failure_is_only_logged() {
        let h = harness().await;
        let id = h
            .service
            .schedule_backup(schedule_request("mongo-1", BackupMode::Pitr))
            .await
            .unwrap()
            .scheduled_backup_id;

        h.executor
            .fail_next(ExecutorError::IncompatiblePbm("pbm agent missing".into()));
        h.service
            .remove_scheduled_backup(CancellationToken::new(), &id)
            .await
            .unwrap();
        assert!(h.executor.pitr_switches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_disables_schedules() {
        let h = harness().await;
        let id = h
            .service
            .schedule_backup(schedule_request("mysql-1", BackupMode::Snapshot))
            .await
            .unwrap()
            .scheduled_backup_id;

        let response = h
            .service
            .restore_backup(
                CancellationToken::new(),
                RestoreBackupRequest {
                    service_id: "mysql-1".into(),
                    artifact_id: "artifact-1".into(),
                    pitr_timestamp: None,
                },
            )
            .await
            .unwrap();
        assert!(!response.restore_id.is_empty());
        assert!(!h.service.scheduler().is_registered(&id));

        let listed = h.service.list_scheduled_backups().await.unwrap();
        assert!(!listed[0].enabled);
        assert_eq!(
            h.executor.restores.lock().unwrap().as_slice(),
            &[("mysql-1".to_string(), "artifact-1".to_string(), None)]
        );

        h.executor
            .fail_next(ExecutorError::TimestampOutOfRange("before first oplog".into()));
        let status = status_of(
            h.service
                .restore_backup(
                    CancellationToken::new(),
                    RestoreBackupRequest {
                        service_id: "mysql-1".into(),
                        artifact_id: "artifact-1".into(),
                        pitr_timestamp: Some(Utc::now()),
                    },
                )
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::OutOfRange);
    }

    #[tokio::test]
    async fn test_get_logs() {
        let h = harness().await;

        let status = status_of(
            h.service
                .get_logs(GetLogsRequest {
                    artifact_id: "art-1".into(),
                    ..Default::default()
                })
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::NotFound);
        assert_eq!(status.message, "Job related to artifact was not found.");

        h.db.transaction(|conn| {
            let job = jobs::create_job(conn, JobType::MySqlBackup, "mysql-1", Some("art-1"))?;
            for chunk_id in 0..4 {
                jobs::append_job_log(
                    conn,
                    &JobLog {
                        job_id: job.id.clone(),
                        chunk_id,
                        data: format!("line {chunk_id}"),
                        last_chunk: false,
                    },
                )?;
            }
            jobs::append_job_log(
                conn,
                &JobLog {
                    job_id: job.id.clone(),
                    chunk_id: 4,
                    data: String::new(),
                    last_chunk: true,
                },
            )
        })
        .await
        .unwrap();

        let page = h
            .service
            .get_logs(GetLogsRequest {
                artifact_id: "art-1".into(),
                offset: 0,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(page.logs.len(), 2);
        assert!(!page.end);
        assert_eq!(page.logs[1].data, "line 1");

        let rest = h
            .service
            .get_logs(GetLogsRequest {
                artifact_id: "art-1".into(),
                offset: 2,
                limit: 0,
            })
            .await
            .unwrap();
        assert_eq!(rest.logs.len(), 2);
        assert_eq!(rest.logs[0].chunk_id, 2);
        assert!(rest.end);
    }

    #[tokio::test]
    async fn test_get_logs_restore_and_first_job() {
        let h = harness().await;

        h.db.transaction(|conn| {
            let job = jobs::create_job(conn, JobType::MongoDbRestore, "mongo-1", Some("art-r"))?;
            jobs::append_job_log(
                conn,
                &JobLog {
                    job_id: job.id,
                    chunk_id: 0,
                    data: "restore started".into(),
                    last_chunk: false,
                },
            )
        })
        .await
        .unwrap();

        let logs = h
            .service
            .get_logs(GetLogsRequest {
                artifact_id: "art-r".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(logs.logs.len(), 1);
        assert_eq!(logs.logs[0].data, "restore started");

        // 关联多个作业时读取最早的一个
        for data in ["first backup", "later restore"] {
            let job_type = if data == "first backup" {
                JobType::MongoDbBackup
            } else {
                JobType::MongoDbRestore
            };
            h.db.transaction(move |conn| {
                let job = jobs::create_job(conn, job_type, "mongo-1", Some("art-m"))?;
                jobs::append_job_log(
                    conn,
                    &JobLog {
                        job_id: job.id,
                        chunk_id: 0,
                        data: data.into(),
                        last_chunk: false,
                    },
                )
            })
            .await
            .unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let logs = h
            .service
            .get_logs(GetLogsRequest {
                artifact_id: "art-m".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(logs.logs.len(), 1);
        assert_eq!(logs.logs[0].data, "first backup");
    }

    #[tokio::test]
    async fn test_list_artifacts() {
        let h = harness().await;
        let id = insert_artifact(&h.db, BackupMode::Snapshot, false).await;

        let listed = h.service.list_artifacts().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].artifact_id, id);
        assert_eq!(listed[0].service_name, "mongo-1-name");
        assert_eq!(listed[0].location_name, "loc-1-name");
    }

    #[tokio::test]
    async fn test_list_pitr_timeranges() {
        let h = harness_with(vec![Timeline {
            replica_set: "rs0".into(),
            start: 1_700_000_000,
            end: 1_700_003_600,
        }])
        .await;

        let status = status_of(
            h.service
                .list_pitr_timeranges(CancellationToken::new(), "missing")
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::NotFound);
        assert_eq!(status.message, "Artifact with ID 'missing' not found.");

        let snapshot = insert_artifact(&h.db, BackupMode::Snapshot, false).await;
        let status = status_of(
            h.service
                .list_pitr_timeranges(CancellationToken::new(), &snapshot)
                .await
                .unwrap_err(),
        );
        assert_eq!(status.code, Code::FailedPrecondition);
        assert_eq!(status.message, "Artifact is not a PITR artifact.");

        let sharded = insert_artifact(&h.db, BackupMode::Pitr, true).await;
        let status = status_of(
            h.service
                .list_pitr_timeranges(CancellationToken::new(), &sharded)
                .await
                .unwrap_err(),
        );
        assert_eq!(
            status.message,
            "Getting PITR timeranges is not supported for sharded cluster artifacts."
        );

        let pitr = insert_artifact(&h.db, BackupMode::Pitr, false).await;
        let ranges = h
            .service
            .list_pitr_timeranges(CancellationToken::new(), &pitr)
            .await
            .unwrap();
        assert_eq!(
            ranges,
            vec![PitrTimerange {
                start_timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
                end_timestamp: DateTime::from_timestamp(1_700_003_600, 0).unwrap(),
            }]
        );
    }

    #[tokio::test]
    async fn test_list_service_compression() {
        let h = harness().await;

        let mysql = h.service.list_service_compression("mysql-1").await.unwrap();
        assert_eq!(mysql.len(), 5);
        assert!(mysql.contains(&BackupCompression::QuickLz));

        let mongo = h.service.list_service_compression("mongo-1").await.unwrap();
        assert_eq!(mongo.len(), 8);

        let status = status_of(h.service.list_service_compression("pg-1").await.unwrap_err());
        assert_eq!(status.code, Code::Unimplemented);
        assert_eq!(
            status.message,
            "backup compression is not yet supported for service type: postgresql"
        );
    }

    #[test]
    fn test_convert_error() {
        let cases = [
            (BackupError::NotFound("artifact".into()), Code::NotFound),
            (BackupError::AlreadyExists("task".into()), Code::AlreadyExists),
            (BackupError::ScheduleOverlap, Code::FailedPrecondition),
            (BackupError::LocationFolderPairAlreadyUsed, Code::FailedPrecondition),
            (BackupError::Validation("bad".into()), Code::InvalidArgument),
            (BackupError::Cron("bad".into()), Code::InvalidArgument),
            (
                ExecutorError::AgentNotSupported("old agent".into()).into(),
                Code::FailedPrecondition,
            ),
            (
                ExecutorError::ArtifactNotReady("pending".into()).into(),
                Code::FailedPrecondition,
            ),
            (
                ExecutorError::TimestampOutOfRange("late".into()).into(),
                Code::OutOfRange,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(convert_error(err).code(), code);
        }

        let converted = convert_error(ExecutorError::IncompatibleTargetMongoDb("4.0".into()).into());
        assert_eq!(
            converted.as_status().unwrap().error_code,
            Some(ErrorCode::IncompatibleTargetMongodb)
        );

        // 已转换的状态保持不变，其他错误原样返回
        let status = Status::invalid_argument("keep me");
        assert_eq!(convert_error(status.clone().into()).as_status(), Some(&status));
        assert!(matches!(convert_error(BackupError::Cancelled), BackupError::Cancelled));
        assert!(matches!(
            convert_error(ExecutorError::Failed("boom".into()).into()),
            BackupError::Executor(ExecutorError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_memory_database() {
        let mut config = AppConfig::default();
        config.database.path = ":memory:".into();
        config.scheduler.tick_interval_ms = 20;

        let (executor, _started) = FakeExecutor::new();
        let service = BackupService::from_config(
            &config,
            Arc::new(executor),
            Arc::new(FakeInspector { timelines: Vec::new() }),
        )
        .await
        .unwrap();
        assert!(service.list_scheduled_backups().await.unwrap().is_empty());
    }
}
