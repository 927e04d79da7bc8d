//! 计划任务调度

pub mod cron;
pub mod preconditions;
pub mod service;
pub mod task;

pub use service::{AddParams, Scheduler};
pub use task::{BackupTaskParams, MongoDbBackupTask, MySqlBackupTask, Task};
