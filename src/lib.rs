// Backup Daemon Library
// 定时文件备份守护进程核心库

// 自动备份模块
pub mod autobackup;

// 配置管理模块
pub mod config;

// Web服务器模块
pub mod server;

// 导出常用类型
pub use autobackup::{
    AutoBackupManager, BackupConfig, BackupError, BackupOutcome, BackupRunner, TriggerSource,
};
pub use config::AppConfig;
pub use server::{build_router, AppState};
