//! 计划任务表操作
//!
//! 所有函数都接收 `&Connection`，既可在 `Database::transaction` 中调用，也可在 `Database::read` 中调用。

use chrono::{DateTime, Utc};
use duckdb::{Connection, Row, params};
use tracing::warn;
use uuid::Uuid;

use crate::error::{BackupError, Result};
use crate::models::{
    ChangeScheduledTaskParams, CreateScheduledTaskParams, ScheduledTask, ScheduledTaskData,
    ScheduledTasksFilter,
};
use crate::scheduler::cron::parse_schedule;

const SELECT_COLUMNS: &str = "SELECT id, cron_expression, type, data, disabled, running, last_run, next_run, start_at, error, created_at, updated_at FROM scheduled_tasks";

/// 数据库行的原始形态，载荷在行读取结束后再解码
struct RawScheduledTask {
    id: String,
    cron_expression: String,
    task_type: String,
    data: String,
    disabled: bool,
    running: bool,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    start_at: Option<DateTime<Utc>>,
    error: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawScheduledTask {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cron_expression: row.get(1)?,
            task_type: row.get(2)?,
            data: row.get(3)?,
            disabled: row.get(4)?,
            running: row.get(5)?,
            last_run: row.get(6)?,
            next_run: row.get(7)?,
            start_at: row.get(8)?,
            error: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn decode(self) -> Result<ScheduledTask> {
        let data = ScheduledTaskData::decode(&self.task_type, &self.data).map_err(|e| {
            BackupError::custom(format!("计划任务 {} 载荷解码失败: {e}", self.id))
        })?;

        Ok(ScheduledTask {
            id: self.id,
            cron_expression: self.cron_expression,
            start_at: self.start_at,
            last_run: self.last_run,
            next_run: self.next_run,
            data,
            disabled: self.disabled,
            running: self.running,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// 创建计划任务，Cron 表达式无效时拒绝写入
pub fn create_scheduled_task(
    conn: &Connection,
    params: CreateScheduledTaskParams,
) -> Result<ScheduledTask> {
    parse_schedule(&params.cron_expression)?;

    let now = Utc::now();
    let task = ScheduledTask {
        id: Uuid::now_v7().to_string(),
        cron_expression: params.cron_expression,
        start_at: params.start_at,
        last_run: None,
        next_run: None,
        data: params.data,
        disabled: params.disabled,
        running: false,
        error: String::new(),
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO scheduled_tasks (id, cron_expression, type, data, disabled, running, last_run, next_run, start_at, error, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            task.id,
            task.cron_expression,
            task.task_type().as_str(),
            task.data.encode()?,
            task.disabled,
            task.running,
            task.last_run,
            task.next_run,
            task.start_at,
            task.error,
            task.created_at,
            task.updated_at,
        ],
    )?;

    Ok(task)
}

/// 按条件查询计划任务
///
/// 载荷内字段（服务、位置、目录等）在解码后过滤。载荷无法解码的行记录日志后跳过。
pub fn find_scheduled_tasks(
    conn: &Connection,
    filter: &ScheduledTasksFilter,
) -> Result<Vec<ScheduledTask>> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at"))?;
    let rows = stmt.query_map([], RawScheduledTask::from_row)?;

    let mut tasks = Vec::new();
    for row in rows {
        let task = match row?.decode() {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "跳过无法解码的计划任务");
                continue;
            }
        };
        if filter.matches(&task) {
            tasks.push(task);
        }
    }
    Ok(tasks)
}

/// 按 ID 查询计划任务
pub fn find_scheduled_task_by_id(conn: &Connection, id: &str) -> Result<ScheduledTask> {
    let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?"))?;
    let mut rows = stmt.query_map([id], RawScheduledTask::from_row)?;

    match rows.next() {
        Some(row) => row?.decode(),
        None => Err(BackupError::NotFound(format!("scheduled task with id '{id}'"))),
    }
}

/// 部分更新计划任务，返回更新后的任务
pub fn change_scheduled_task(
    conn: &Connection,
    id: &str,
    params: ChangeScheduledTaskParams,
) -> Result<ScheduledTask> {
    let mut task = find_scheduled_task_by_id(conn, id)?;

    if let Some(data) = params.data {
        if data.task_type() != task.task_type() {
            return Err(BackupError::custom(format!(
                "计划任务 {id} 类型不可变更: {} -> {}",
                task.task_type(),
                data.task_type()
            )));
        }
        task.data = data;
    }
    params.data_change.apply(&mut task.data);
    if let Some(cron_expression) = params.cron_expression {
        parse_schedule(&cron_expression)?;
        task.cron_expression = cron_expression;
    }
    if let Some(disable) = params.disable {
        task.disabled = disable;
    }
    if let Some(running) = params.running {
        task.running = running;
    }
    if let Some(error) = params.error {
        task.error = error;
    }
    if let Some(next_run) = params.next_run {
        task.next_run = next_run;
    }
    if let Some(last_run) = params.last_run {
        task.last_run = last_run;
    }
    task.updated_at = Utc::now();

    conn.execute(
        "UPDATE scheduled_tasks SET cron_expression = ?, data = ?, disabled = ?, running = ?, error = ?, next_run = ?, last_run = ?, updated_at = ?
         WHERE id = ?",
        params![
            task.cron_expression,
            task.data.encode()?,
            task.disabled,
            task.running,
            task.error,
            task.next_run,
            task.last_run,
            task.updated_at,
            task.id,
        ],
    )?;

    Ok(task)
}

/// 删除计划任务
pub fn remove_scheduled_task(conn: &Connection, id: &str) -> Result<()> {
    let affected = conn.execute("DELETE FROM scheduled_tasks WHERE id = ?", [id])?;
    if affected == 0 {
        return Err(BackupError::NotFound(format!("scheduled task with id '{id}'")));
    }
    Ok(())
}
