//! 自动备份模块
//!
//! 定时把指定文件/目录打包为带时间戳的归档，支持：
//! - 启动备份（延迟执行，等待系统稳定）
//! - 定时轮询（到达备份间隔后执行）
//! - 手动触发（webhook）
//! - 保留策略（只保留最新的若干个归档）
//! - 单实例执行（并发触发直接跳过）

pub mod archive;
pub mod config;
pub mod error;
pub mod filter;
pub mod manager;
pub mod retention;
pub mod runner;
pub mod scheduler;

pub use archive::{ArchiveBuilder, ArchiveOutcome, FailedItem};
pub use config::{BackupConfig, DEFAULT_BACKUP_ITEMS};
pub use error::{BackupError, ErrorCategory};
pub use manager::{ArchiveInfo, AutoBackupManager, ManagerStatus};
pub use retention::{RetentionManager, RetentionReport};
pub use runner::{BackupOutcome, BackupRun, BackupRunner, RunnerStatus, TriggerSource};
pub use scheduler::{BackupScheduler, SchedulerState, SchedulerTimings};
