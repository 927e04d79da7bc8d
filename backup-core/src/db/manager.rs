use crate::Result;
use crate::constants::database::{MAX_READ_RETRIES, RETRY_BASE_DELAY_MS};
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// DuckDB 数据库 - 针对调度场景的并发控制
///
/// 设计原则：
/// - 写操作：所有事务共享同一个写连接，持锁从 BEGIN 到 COMMIT，事务天然串行
/// - 读操作：从写连接克隆只读连接，只能看到已提交数据，冲突时退避重试
/// - 事务闭包返回错误时，事务随之回滚
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    /// 数据库路径（None表示内存数据库）
    db_path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_path", &self.inner.db_path)
            .finish()
    }
}

impl Database {
    /// 连接到文件数据库
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let connection = Connection::open(&db_path)?;
        debug!("数据库文件连接成功: {:?}", db_path);

        Self::with_connection(Some(db_path), connection).await
    }

    /// 创建内存数据库（主要用于测试）
    pub async fn connect_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        debug!("内存数据库连接创建成功");

        Self::with_connection(None, connection).await
    }

    async fn with_connection(db_path: Option<PathBuf>, connection: Connection) -> Result<Self> {
        let database = Self {
            inner: Arc::new(DatabaseInner {
                db_path,
                connection: Mutex::new(connection),
            }),
        };

        // 初始化数据库表
        database.initialize_schema().await?;

        Ok(database)
    }

    pub fn is_memory(&self) -> bool {
        self.inner.db_path.is_none()
    }

    /// 在单个可串行化事务中执行操作
    ///
    /// 闭包返回 Ok 时提交，返回 Err 时回滚。闭包内不能再次调用 `transaction`。
    ///
    /// 闭包在当前 tokio 工作线程上同步执行，并借用调用方的状态（前置检查、作业登记），
    /// 因此不能移入 `spawn_blocking`。闭包内只做计划任务元数据的小规模读写，
    /// 不得包含备份执行、网络请求等耗时操作。
    pub async fn transaction<F, R>(&self, operation: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send,
        R: Send,
    {
        let mut conn = self.inner.connection.lock().await;
        let tx = conn.transaction()?;

        match operation(&*tx) {
            Ok(result) => {
                tx.commit()?;
                debug!("事务提交成功");
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!("事务回滚失败: {}", rollback_err);
                }
                debug!("事务已回滚: {}", e);
                Err(e)
            }
        }
    }

    /// 读操作，遇到临时性错误时重试
    pub async fn read<F, R>(&self, operation: F) -> Result<R>
    where
        F: Fn(&Connection) -> Result<R> + Send + Sync,
        R: Send,
    {
        let mut retry_count = 0;

        loop {
            // 克隆出独立连接，不阻塞写事务
            let conn = {
                let guard = self.inner.connection.lock().await;
                guard.try_clone()?
            };

            match operation(&conn) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let error_msg = e.to_string();

                    if Self::is_retryable_error(&error_msg) && retry_count < MAX_READ_RETRIES {
                        retry_count += 1;
                        let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * retry_count as u64);
                        warn!(
                            "读操作失败，{}ms后重试 ({}/{}): {}",
                            delay.as_millis(),
                            retry_count,
                            MAX_READ_RETRIES,
                            error_msg
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(e);
                }
            }
        }
    }

    /// 检查错误是否可重试
    fn is_retryable_error(error_msg: &str) -> bool {
        // DuckDB 的 write-write conflict 错误模式
        error_msg.contains("write-write conflict")
            || error_msg.contains("Conflict on")
            || error_msg.contains("database is locked")
            || error_msg.contains("database is busy")
    }

    /// 初始化数据库表结构
    async fn initialize_schema(&self) -> Result<()> {
        debug!("正在初始化数据库表结构...");

        let schema_sql = include_str!("../../migrations/init_duckdb.sql");

        let conn = self.inner.connection.lock().await;
        if let Err(e) = conn.execute_batch(schema_sql) {
            error!("数据库表结构初始化失败: {}", e);
            return Err(e.into());
        }

        debug!("数据库表结构初始化完成");
        Ok(())
    }

    /// 获取所有表名
    #[cfg(test)]
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT table_name FROM duckdb_tables() ORDER BY table_name")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut tables = Vec::new();
            for table in rows {
                tables.push(table?);
            }
            Ok(tables)
        })
        .await
    }
}
