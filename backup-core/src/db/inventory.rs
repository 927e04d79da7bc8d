//! 服务清单与存储位置
//!
//! 这两张表由平台其他模块维护，这里提供查询以及初始化用的写入函数。

use duckdb::{Connection, params};

use crate::error::{BackupError, Result};
use crate::models::{BackupLocation, Service};

pub fn insert_service(conn: &Connection, service: &Service) -> Result<()> {
    conn.execute(
        "INSERT INTO services (service_id, service_name, service_type, cluster) VALUES (?, ?, ?, ?)",
        params![
            service.service_id,
            service.service_name,
            service.service_type.as_str(),
            service.cluster,
        ],
    )?;
    Ok(())
}

pub fn find_service_by_id(conn: &Connection, service_id: &str) -> Result<Service> {
    let mut stmt = conn.prepare(
        "SELECT service_id, service_name, service_type, cluster FROM services WHERE service_id = ?",
    )?;
    let mut rows = stmt.query_map([service_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    match rows.next() {
        Some(row) => {
            let (service_id, service_name, service_type, cluster) = row?;
            Ok(Service {
                service_id,
                service_name,
                service_type: service_type.parse()?,
                cluster,
            })
        }
        None => Err(BackupError::NotFound(format!(
            "service with id '{service_id}'"
        ))),
    }
}

/// 按 ID 批量查询服务，不存在的 ID 直接忽略
pub fn find_services_by_ids(conn: &Connection, service_ids: &[String]) -> Result<Vec<Service>> {
    let mut services = Vec::with_capacity(service_ids.len());
    for service_id in service_ids {
        match find_service_by_id(conn, service_id) {
            Ok(service) => services.push(service),
            Err(BackupError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(services)
}

/// 按 ID 批量查询存储位置，不存在的 ID 直接忽略
pub fn find_locations_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<BackupLocation>> {
    let mut locations = Vec::with_capacity(ids.len());
    for id in ids {
        match find_location_by_id(conn, id) {
            Ok(location) => locations.push(location),
            Err(BackupError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(locations)
}

pub fn insert_location(conn: &Connection, location: &BackupLocation) -> Result<()> {
    conn.execute(
        "INSERT INTO backup_locations (id, name, description, location_type, config) VALUES (?, ?, ?, ?, ?)",
        params![
            location.id,
            location.name,
            location.description,
            location.location_type.as_str(),
            location.config.to_string(),
        ],
    )?;
    Ok(())
}

pub fn find_location_by_id(conn: &Connection, id: &str) -> Result<BackupLocation> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, location_type, config FROM backup_locations WHERE id = ?",
    )?;
    let mut rows = stmt.query_map([id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    match rows.next() {
        Some(row) => {
            let (id, name, description, location_type, config) = row?;
            Ok(BackupLocation {
                id,
                name,
                description,
                location_type: location_type.parse()?,
                config: serde_json::from_str(&config)?,
            })
        }
        None => Err(BackupError::NotFound(format!("backup location with id '{id}'"))),
    }
}
