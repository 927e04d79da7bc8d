//! 调度器：持久化计划任务，维护 Cron 作业登记表并驱动执行
//!
//! 数据库中的计划任务是唯一权威状态；内存中的作业表和取消令牌表只是缓存，
//! 启动时通过 `run()` 从数据库重建。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backup::executor::BackupExecutor;
use crate::db::{Database, artifacts, scheduled_tasks};
use crate::error::{BackupError, Result};
use crate::models::{
    ChangeScheduledTaskParams, CreateScheduledTaskParams, ScheduledTask, ScheduledTasksFilter,
};
use crate::scheduler::cron::{CronDriver, CronJob, JobFn};
use crate::scheduler::preconditions;
use crate::scheduler::task::{Task, task_from_data};

/// 新建计划任务的调度参数
#[derive(Debug, Clone, Default)]
pub struct AddParams {
    pub cron_expression: String,
    pub disabled: bool,
    pub start_at: Option<DateTime<Utc>>,
}

pub struct Scheduler {
    db: Database,
    backup_executor: Arc<dyn BackupExecutor>,
    driver: Mutex<CronDriver>,
    /// 正在执行的任务及其取消令牌
    tasks: DashMap<String, CancellationToken>,
    /// 已登记的作业
    jobs: DashMap<String, Arc<CronJob>>,
    tick_interval: Duration,
    self_ref: Weak<Scheduler>,
}

/// 任务执行结束时取消并注销令牌
struct CancelGuard<'a> {
    tasks: &'a DashMap<String, CancellationToken>,
    id: &'a str,
    token: CancellationToken,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.token.cancel();
        self.tasks.remove(self.id);
    }
}

impl Scheduler {
    pub fn new(
        db: Database,
        backup_executor: Arc<dyn BackupExecutor>,
        tick_interval: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            db,
            backup_executor,
            driver: Mutex::new(CronDriver::new()),
            tasks: DashMap::new(),
            jobs: DashMap::new(),
            tick_interval,
            self_ref: self_ref.clone(),
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn backup_executor(&self) -> Arc<dyn BackupExecutor> {
        Arc::clone(&self.backup_executor)
    }

    /// 已登记作业的下次触发时间
    pub fn next_run(&self, id: &str) -> Option<DateTime<Utc>> {
        self.jobs.get(id).and_then(|job| job.next_run())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.jobs.contains_key(id)
    }

    /// 当前是否有该任务的执行在进行
    pub fn is_running(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    fn lock_driver(&self) -> MutexGuard<'_, CronDriver> {
        match self.driver.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 运行调度循环，直到 `shutdown` 被取消
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        if let Err(e) = self.load_from_db().await {
            warn!(error = %e, "从数据库加载计划任务失败");
        }

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = self.tick_interval.as_millis() as u64, "调度器已启动");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("调度器已停止");
                    break;
                }
                _ = interval.tick() => {
                    let fired = self.lock_driver().run_pending(Utc::now());
                    if fired > 0 {
                        debug!(fired, "触发到期作业");
                    }
                }
            }
        }
    }

    /// 新建计划任务
    ///
    /// 前置检查、写入和作业登记在同一事务内完成；任何一步失败都会回滚并注销作业。
    #[instrument(skip(self, task), fields(task_type = %task.task_type()))]
    pub async fn add(&self, task: &dyn Task, params: AddParams) -> Result<ScheduledTask> {
        let data = task.data();
        let mut registered: Option<Arc<CronJob>> = None;

        let result = self
            .db
            .transaction(|conn| {
                preconditions::check_scheduled_task(conn, &data, !params.disabled, None)?;

                let row = scheduled_tasks::create_scheduled_task(
                    conn,
                    CreateScheduledTaskParams {
                        cron_expression: params.cron_expression,
                        start_at: params.start_at,
                        data,
                        disabled: params.disabled,
                    },
                )?;
                if row.disabled {
                    return Ok(row);
                }

                let job = self.add_db_task(&row)?;
                registered = Some(Arc::clone(&job));

                scheduled_tasks::change_scheduled_task(
                    conn,
                    &row.id,
                    ChangeScheduledTaskParams {
                        next_run: Some(job.next_run()),
                        last_run: Some(job.last_run()),
                        ..Default::default()
                    },
                )
            })
            .await;

        match &result {
            Ok(row) => info!(task_id = %row.id, disabled = row.disabled, "计划任务已创建"),
            Err(e) => {
                if let Some(job) = registered {
                    self.deregister(&job);
                }
                warn!(error = %e, "创建计划任务失败");
            }
        }
        result
    }

    /// 更新计划任务，重新检查前置条件并重新登记作业
    #[instrument(skip(self, params))]
    pub async fn update(&self, id: &str, params: ChangeScheduledTaskParams) -> Result<ScheduledTask> {
        let mut registered: Option<Arc<CronJob>> = None;
        let mut replaced: Option<Arc<CronJob>> = None;

        let result = self
            .db
            .transaction(|conn| {
                let existing = scheduled_tasks::find_scheduled_task_by_id(conn, id)?;
                let enabled = params.disable.map(|d| !d).unwrap_or(!existing.disabled);

                // 字段级修改基于本事务读到的载荷合并
                let mut params = params;
                let mut data = params.data.take().unwrap_or(existing.data);
                std::mem::take(&mut params.data_change).apply(&mut data);

                task_from_data(id, &data)?;
                preconditions::check_scheduled_task(conn, &data, enabled, Some(id))?;

                params.data = Some(data);
                if !enabled {
                    params.next_run = Some(None);
                }
                let row = scheduled_tasks::change_scheduled_task(conn, id, params)?;

                replaced = self.lock_driver().remove_by_tag(id);
                self.jobs.remove(id);
                if !enabled {
                    return Ok(row);
                }

                let job = self.add_db_task(&row)?;
                registered = Some(Arc::clone(&job));

                scheduled_tasks::change_scheduled_task(
                    conn,
                    id,
                    ChangeScheduledTaskParams {
                        next_run: Some(job.next_run()),
                        ..Default::default()
                    },
                )
            })
            .await;

        if let Err(e) = &result {
            if let Some(job) = registered {
                self.deregister(&job);
            }
            if let Some(job) = replaced {
                if self.lock_driver().reinstate(Arc::clone(&job)) {
                    self.jobs.insert(id.to_string(), job);
                }
            }
            warn!(error = %e, "更新计划任务失败");
        } else {
            info!("计划任务已更新");
        }
        result
    }

    /// 删除计划任务：取消正在进行的执行，解除产物关联后删除记录
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<()> {
        if let Some((_, token)) = self.tasks.remove(id) {
            debug!("取消正在执行的任务");
            token.cancel();
        }
        let job = self.jobs.remove(id).map(|(_, job)| job);

        let result = self
            .db
            .transaction(|conn| {
                let detached = artifacts::detach_schedule(conn, id)?;
                scheduled_tasks::remove_scheduled_task(conn, id)?;
                Ok(detached)
            })
            .await;

        match result {
            Ok(detached) => {
                if let Some(job) = job {
                    self.lock_driver().remove_by_reference(&job);
                }
                info!(detached_artifacts = detached, "计划任务已删除");
                Ok(())
            }
            Err(e) => {
                if let Some(job) = job {
                    self.jobs.insert(id.to_string(), job);
                }
                Err(e)
            }
        }
    }

    /// 清空内存登记表，按数据库中的启用任务重新登记
    async fn load_from_db(&self) -> Result<()> {
        let rows = self
            .db
            .read(|conn| {
                scheduled_tasks::find_scheduled_tasks(
                    conn,
                    &ScheduledTasksFilter {
                        disabled: Some(false),
                        ..Default::default()
                    },
                )
            })
            .await?;

        self.lock_driver().clear();
        self.jobs.clear();

        let mut loaded = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.add_db_task(row) {
                Ok(job) => loaded.push((row.id.clone(), job.next_run())),
                Err(e) => warn!(task_id = %row.id, error = %e, "计划任务登记失败"),
            }
        }
        info!(count = loaded.len(), "已从数据库加载计划任务");

        // 重启后没有执行在进行，同时刷新下次触发时间
        let result = self
            .db
            .transaction(|conn| {
                for (id, next_run) in loaded {
                    scheduled_tasks::change_scheduled_task(
                        conn,
                        &id,
                        ChangeScheduledTaskParams {
                            running: Some(false),
                            next_run: Some(next_run),
                            ..Default::default()
                        },
                    )?;
                }
                Ok(())
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "刷新计划任务状态失败");
        }
        Ok(())
    }

    /// 为数据库中的任务登记 Cron 作业
    fn add_db_task(&self, row: &ScheduledTask) -> Result<Arc<CronJob>> {
        let task: Arc<dyn Task> = Arc::from(task_from_data(&row.id, &row.data)?);
        let id = row.id.clone();
        let scheduler = self.self_ref.clone();

        let func: JobFn = Arc::new(move || {
            let scheduler = scheduler.clone();
            let task = Arc::clone(&task);
            let id = id.clone();
            Box::pin(async move {
                if let Some(scheduler) = scheduler.upgrade() {
                    scheduler.run_task(&id, task).await;
                }
            })
        });

        let job = self.lock_driver().register(
            &row.id,
            &row.cron_expression,
            row.start_at,
            func,
            Utc::now(),
        )?;
        self.jobs.insert(row.id.clone(), Arc::clone(&job));
        Ok(job)
    }

    fn deregister(&self, job: &Arc<CronJob>) {
        self.lock_driver().remove_by_reference(job);
        self.jobs.remove_if(job.tag(), |_, current| Arc::ptr_eq(current, job));
    }

    /// 单次触发：登记取消令牌，标记运行状态，执行任务并记录结果
    async fn run_task(&self, id: &str, task: Arc<dyn Task>) {
        let token = CancellationToken::new();
        self.tasks.insert(id.to_string(), token.clone());
        let _guard = CancelGuard {
            tasks: &self.tasks,
            id,
            token: token.clone(),
        };

        let result = self
            .db
            .transaction(|conn| {
                scheduled_tasks::change_scheduled_task(
                    conn,
                    id,
                    ChangeScheduledTaskParams {
                        running: Some(true),
                        ..Default::default()
                    },
                )
            })
            .await;
        match result {
            Ok(_) => {}
            Err(BackupError::NotFound(_)) => {
                debug!(task_id = %id, "计划任务已被删除，跳过本次执行");
                return;
            }
            Err(e) => error!(task_id = %id, error = %e, "更新运行状态失败"),
        }

        debug!(task_id = %id, "开始执行计划任务");
        let outcome = task.run(token, self).await;
        if let Err(e) = &outcome {
            error!(task_id = %id, error = %e, "计划任务执行失败");
        }

        self.task_finished(id, outcome).await;
    }

    /// 执行结束后的状态回写，失败只记录日志
    async fn task_finished(&self, id: &str, outcome: Result<()>) {
        let job = self.jobs.get(id).map(|job| Arc::clone(job.value()));
        let (next_run, last_run) = match &job {
            Some(job) => (Some(job.next_run()), Some(job.last_run())),
            None => (None, None),
        };

        let params = ChangeScheduledTaskParams {
            running: Some(false),
            error: Some(outcome.err().map(|e| e.to_string()).unwrap_or_default()),
            next_run,
            last_run,
            ..Default::default()
        };

        let result = self
            .db
            .transaction(|conn| scheduled_tasks::change_scheduled_task(conn, id, params))
            .await;
        match result {
            Ok(_) => debug!(task_id = %id, "计划任务执行完成"),
            Err(BackupError::NotFound(_)) => {
                debug!(task_id = %id, "计划任务已被删除，跳过状态回写")
            }
            Err(e) => error!(task_id = %id, error = %e, "回写任务执行结果失败"),
        }
    }
}
