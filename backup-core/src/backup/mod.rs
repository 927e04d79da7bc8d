//! 备份编排：请求校验、执行器接口与对外服务

pub mod executor;
pub mod pitr;
pub mod service;
pub mod types;
pub mod validation;

pub use executor::{BackupExecutor, ExecutorError, PerformBackupParams};
pub use pitr::{PitrTimerangeInspector, Timeline};
pub use service::{BackupService, convert_error};
