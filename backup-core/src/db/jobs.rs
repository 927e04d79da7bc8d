//! 执行作业与作业日志

use chrono::Utc;
use duckdb::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Job, JobLog, JobType};

/// 创建作业记录
pub fn create_job(
    conn: &Connection,
    job_type: JobType,
    service_id: &str,
    artifact_id: Option<&str>,
) -> Result<Job> {
    let job = Job {
        id: Uuid::now_v7().to_string(),
        job_type,
        service_id: service_id.to_string(),
        artifact_id: artifact_id.map(str::to_string),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO jobs (id, job_type, service_id, artifact_id, created_at) VALUES (?, ?, ?, ?, ?)",
        params![
            job.id,
            job.job_type.as_str(),
            job.service_id,
            job.artifact_id,
            job.created_at,
        ],
    )?;
    Ok(job)
}

/// 查询与备份产物关联的作业
pub fn find_jobs_by_artifact(conn: &Connection, artifact_id: &str) -> Result<Vec<Job>> {
    let mut stmt = conn.prepare(
        "SELECT id, job_type, service_id, artifact_id, created_at FROM jobs WHERE artifact_id = ? ORDER BY created_at",
    )?;
    let rows = stmt.query_map([artifact_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, chrono::DateTime<Utc>>(4)?,
        ))
    })?;

    let mut jobs = Vec::new();
    for row in rows {
        let (id, job_type, service_id, artifact_id, created_at) = row?;
        jobs.push(Job {
            id,
            job_type: job_type.parse()?,
            service_id,
            artifact_id,
            created_at,
        });
    }
    Ok(jobs)
}

/// 追加一块作业日志
pub fn append_job_log(conn: &Connection, log: &JobLog) -> Result<()> {
    conn.execute(
        "INSERT INTO job_logs (job_id, chunk_id, data, last_chunk) VALUES (?, ?, ?, ?)",
        params![log.job_id, log.chunk_id as i64, log.data, log.last_chunk],
    )?;
    Ok(())
}

/// 按块号分页读取作业日志，`limit` 为 None 时读取剩余全部
pub fn find_job_logs(
    conn: &Connection,
    job_id: &str,
    offset: u32,
    limit: Option<u32>,
) -> Result<Vec<JobLog>> {
    let mut sql = String::from(
        "SELECT job_id, chunk_id, data, last_chunk FROM job_logs WHERE job_id = ? ORDER BY chunk_id",
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    sql.push_str(&format!(" OFFSET {offset}"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([job_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut logs = Vec::new();
    for row in rows {
        let (job_id, chunk_id, data, last_chunk) = row?;
        logs.push(JobLog {
            job_id,
            chunk_id: u32::try_from(chunk_id).unwrap_or_default(),
            data,
            last_chunk,
        });
    }
    Ok(logs)
}
