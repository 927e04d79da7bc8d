//! 备份产物表操作

use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use uuid::Uuid;

use crate::error::{BackupError, Result};
use crate::models::{Artifact, ArtifactFilters, BackupStatus, CreateArtifactParams};

const SELECT_COLUMNS: &str = "SELECT id, name, vendor, service_id, location_id, data_model, mode, status, compression, schedule_id, folder, is_sharded_cluster, metadata_list, created_at, updated_at FROM artifacts";

struct RawArtifact {
    id: String,
    name: String,
    vendor: String,
    service_id: String,
    location_id: String,
    data_model: String,
    mode: String,
    status: String,
    compression: String,
    schedule_id: Option<String>,
    folder: String,
    is_sharded_cluster: bool,
    metadata_list: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawArtifact {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            vendor: row.get(2)?,
            service_id: row.get(3)?,
            location_id: row.get(4)?,
            data_model: row.get(5)?,
            mode: row.get(6)?,
            status: row.get(7)?,
            compression: row.get(8)?,
            schedule_id: row.get(9)?,
            folder: row.get(10)?,
            is_sharded_cluster: row.get(11)?,
            metadata_list: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn decode(self) -> Result<Artifact> {
        Ok(Artifact {
            data_model: self.data_model.parse()?,
            mode: self.mode.parse()?,
            status: self.status.parse()?,
            compression: self.compression.parse()?,
            metadata_list: serde_json::from_str(&self.metadata_list)?,
            id: self.id,
            name: self.name,
            vendor: self.vendor,
            service_id: self.service_id,
            location_id: self.location_id,
            schedule_id: self.schedule_id,
            folder: self.folder,
            is_sharded_cluster: self.is_sharded_cluster,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// 创建备份产物记录
pub fn create_artifact(conn: &Connection, params: CreateArtifactParams) -> Result<Artifact> {
    let now = Utc::now();
    let artifact = Artifact {
        id: Uuid::now_v7().to_string(),
        name: params.name,
        vendor: params.vendor,
        service_id: params.service_id,
        location_id: params.location_id,
        data_model: params.data_model,
        mode: params.mode,
        status: params.status,
        compression: params.compression,
        schedule_id: params.schedule_id,
        folder: params.folder,
        is_sharded_cluster: params.is_sharded_cluster,
        metadata_list: serde_json::Value::Array(Vec::new()),
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO artifacts (id, name, vendor, service_id, location_id, data_model, mode, status, compression, schedule_id, folder, is_sharded_cluster, metadata_list, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            artifact.id,
            artifact.name,
            artifact.vendor,
            artifact.service_id,
            artifact.location_id,
            artifact.data_model.as_str(),
            artifact.mode.as_str(),
            artifact.status.as_str(),
            artifact.compression.as_str(),
            artifact.schedule_id,
            artifact.folder,
            artifact.is_sharded_cluster,
            artifact.metadata_list.to_string(),
            artifact.created_at,
            artifact.updated_at,
        ],
    )?;

    Ok(artifact)
}

/// 按条件查询备份产物，按创建时间倒序
pub fn find_artifacts(conn: &Connection, filters: &ArtifactFilters) -> Result<Vec<Artifact>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC"))?;
    let rows = stmt.query_map([], RawArtifact::from_row)?;

    let mut artifacts = Vec::new();
    for row in rows {
        let artifact = row?.decode()?;
        if filters.matches(&artifact) {
            artifacts.push(artifact);
        }
    }
    Ok(artifacts)
}

pub fn find_artifact_by_id(conn: &Connection, id: &str) -> Result<Artifact> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?"))?;
    let mut rows = stmt.query_map([id], RawArtifact::from_row)?;

    match rows.next() {
        Some(row) => row?.decode(),
        None => Err(BackupError::NotFound(format!("artifact with id '{id}'"))),
    }
}

pub fn update_artifact_status(conn: &Connection, id: &str, status: BackupStatus) -> Result<()> {
    let affected = conn.execute(
        "UPDATE artifacts SET status = ?, updated_at = ? WHERE id = ?",
        params![status.as_str(), Utc::now(), id],
    )?;
    if affected == 0 {
        return Err(BackupError::NotFound(format!("artifact with id '{id}'")));
    }
    Ok(())
}

/// 解除产物与计划任务的关联，返回受影响的产物数
pub fn detach_schedule(conn: &Connection, schedule_id: &str) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE artifacts SET schedule_id = NULL, updated_at = ? WHERE schedule_id = ?",
        params![Utc::now(), schedule_id],
    )?;
    Ok(affected)
}
