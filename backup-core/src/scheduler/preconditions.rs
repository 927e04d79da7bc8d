//! 计划任务的前置条件检查
//!
//! 这些检查读取数据库后再决定是否写入，必须在 `Database::transaction` 内调用。

use duckdb::Connection;

use crate::db::{artifacts, scheduled_tasks};
use crate::error::{BackupError, Result, Status};
use crate::models::{
    ArtifactFilters, BackupMode, CommonBackupTaskData, ScheduledTaskData, ScheduledTaskType,
    ScheduledTasksFilter,
};

/// 检查新建或更新的计划任务是否与已有状态冲突
///
/// `own_id` 为正在更新的任务 ID，检查时排除自身。
pub fn check_scheduled_task(
    conn: &Connection,
    data: &ScheduledTaskData,
    enabled: bool,
    own_id: Option<&str>,
) -> Result<()> {
    check_location_folder(conn, data.common(), enabled, own_id)?;

    if enabled {
        if let ScheduledTaskData::MongoDbBackup(common) = data {
            check_mongo_cluster(conn, &common.cluster_name, common.mode, own_id)?;
        }
    }
    Ok(())
}

/// 同一位置的同一目录只能属于一个服务；同一服务在该目录下只能有一个启用的计划
pub fn check_location_folder(
    conn: &Connection,
    data: &CommonBackupTaskData,
    enabled: bool,
    own_id: Option<&str>,
) -> Result<()> {
    let artifacts = artifacts::find_artifacts(
        conn,
        &ArtifactFilters {
            location_id: Some(data.location_id.clone()),
            folder: Some(data.folder.clone()),
            ..Default::default()
        },
    )?;
    if artifacts.iter().any(|a| a.service_id != data.service_id) {
        return Err(BackupError::LocationFolderPairAlreadyUsed);
    }

    let tasks = scheduled_tasks::find_scheduled_tasks(
        conn,
        &ScheduledTasksFilter {
            location_id: Some(data.location_id.clone()),
            folder: Some(data.folder.clone()),
            ..Default::default()
        },
    )?;
    for task in tasks.iter().filter(|t| Some(t.id.as_str()) != own_id) {
        if task.data.common().service_id != data.service_id {
            return Err(BackupError::LocationFolderPairAlreadyUsed);
        }
        if enabled && !task.disabled {
            return Err(BackupError::ScheduleOverlap);
        }
    }
    Ok(())
}

/// MongoDB 集群内 PITR 与其他计划互斥
pub fn check_mongo_cluster(
    conn: &Connection,
    cluster_name: &str,
    mode: BackupMode,
    own_id: Option<&str>,
) -> Result<()> {
    if mode == BackupMode::Incremental {
        return Err(Status::invalid_argument("Incremental backups unsupported for MongoDB").into());
    }

    // 不属于集群的服务无需检查
    if cluster_name.is_empty() {
        return Ok(());
    }

    let tasks = scheduled_tasks::find_scheduled_tasks(
        conn,
        &ScheduledTasksFilter {
            types: vec![ScheduledTaskType::MongoDbBackup],
            disabled: Some(false),
            cluster_name: Some(cluster_name.to_string()),
            ..Default::default()
        },
    )?;
    let mut others = tasks.iter().filter(|t| Some(t.id.as_str()) != own_id);

    match mode {
        BackupMode::Pitr => {
            if others.next().is_some() {
                return Err(Status::failed_precondition(format!(
                    "A PITR backup for cluster '{cluster_name}' can be enabled only if there no other scheduled backups for this cluster."
                ))
                .into());
            }
        }
        BackupMode::Snapshot => {
            if others.any(|t| t.data.common().mode == BackupMode::Pitr) {
                return Err(Status::failed_precondition(format!(
                    "A snapshot backup for cluster '{cluster_name}' can be done only if there is no enabled PITR backup."
                ))
                .into());
            }
        }
        BackupMode::Incremental => {}
    }
    Ok(())
}
