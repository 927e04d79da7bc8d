pub mod backup;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use backup::BackupService;
pub use config::AppConfig;
pub use db::Database;
pub use error::{BackupError, Code, ErrorCode, Result, Status};
pub use scheduler::Scheduler;
