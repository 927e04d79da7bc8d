pub mod artifacts;
pub mod inventory;
pub mod jobs;
pub mod manager;
pub mod scheduled_tasks;

pub use manager::Database;
