//! 调度器模块

pub mod backup_scheduler;

pub use backup_scheduler::{BackupScheduler, SchedulerState, SchedulerStatus, SchedulerTimings};
