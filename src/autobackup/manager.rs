//! 自动备份管理器
//!
//! 宿主生命周期入口：
//! - `on_load`：校验配置，启动调度器并安排启动备份
//! - `on_unload`：停止调度器（有限时间等待）
//! - `trigger_backup_manual`：手动触发（webhook）

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::BackupConfig;
use super::error::BackupError;
use super::retention::list_archives;
use super::runner::{BackupOutcome, BackupRunner, RunnerStatus, TriggerSource};
use super::scheduler::{BackupScheduler, SchedulerStatus, SchedulerTimings};

/// 管理器状态
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    /// 是否启用定时备份
    pub enabled: bool,
    /// 调度器状态
    pub scheduler: SchedulerStatus,
    /// 执行器状态
    pub runner: RunnerStatus,
}

/// 备份目录中的归档信息
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    /// 文件名
    pub name: String,
    /// 文件大小（字节）
    pub size_bytes: u64,
    /// 修改时间
    pub modified_at: DateTime<Utc>,
}

/// 自动备份管理器
pub struct AutoBackupManager {
    /// 备份执行器
    runner: Arc<BackupRunner>,
    /// 调度器
    scheduler: BackupScheduler,
}

impl AutoBackupManager {
    /// 加载并启动
    ///
    /// 需要在 tokio 运行时中调用
    pub fn on_load(config: BackupConfig) -> Result<Arc<Self>, BackupError> {
        Self::on_load_with_timings(config, SchedulerTimings::default())
    }

    /// 使用自定义调度时间加载并启动
    pub fn on_load_with_timings(
        config: BackupConfig,
        timings: SchedulerTimings,
    ) -> Result<Arc<Self>, BackupError> {
        config.validate()?;

        let runner = Arc::new(BackupRunner::new(config));
        let scheduler = BackupScheduler::new(runner.clone(), timings);
        let manager = Arc::new(Self { runner, scheduler });

        let config = manager.runner.config();
        tracing::info!("备份插件加载成功");
        tracing::info!("备份间隔: {} 小时", config.interval_hours);
        tracing::info!("备份位置: {}", config.backup_path.display());
        tracing::info!("最多保留备份数: {}", config.max_backups);

        if config.enabled {
            manager.scheduler.start();
        } else {
            tracing::info!("定时备份已禁用，仅响应手动触发");
        }

        Ok(manager)
    }

    /// 卸载：停止调度器
    pub async fn on_unload(&self) {
        self.scheduler.stop().await;
        tracing::info!("备份插件已卸载");
    }

    /// 手动触发备份
    pub async fn trigger_backup_manual(&self) -> BackupOutcome {
        tracing::info!("通过 webhook 手动触发备份");
        self.runner.run_backup(TriggerSource::Manual).await
    }

    /// 获取备份执行器
    pub fn runner(&self) -> &Arc<BackupRunner> {
        &self.runner
    }

    /// 获取管理器状态
    pub fn get_status(&self) -> ManagerStatus {
        ManagerStatus {
            enabled: self.runner.config().enabled,
            scheduler: self.scheduler.status(),
            runner: self.runner.status(),
        }
    }

    /// 列出备份目录中的归档（最新的在前）
    ///
    /// 备份目录不存在时返回空列表
    pub async fn list_archives(&self) -> Result<Vec<ArchiveInfo>, BackupError> {
        let backup_dir = self.runner.config().backup_path.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<Vec<ArchiveInfo>, BackupError> {
            if !backup_dir.is_dir() {
                return Ok(Vec::new());
            }
            list_archives(&backup_dir)?
                .into_iter()
                .map(|archive| -> Result<ArchiveInfo, BackupError> {
                    let size_bytes = std::fs::metadata(&archive.path)?.len();
                    Ok(ArchiveInfo {
                        name: archive
                            .path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                        size_bytes,
                        modified_at: DateTime::<Utc>::from(archive.modified),
                    })
                })
                .collect()
        })
        .await;

        match result {
            Ok(archives) => archives,
            Err(e) => Err(BackupError::Internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autobackup::scheduler::SchedulerState;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_config(root: &std::path::Path, enabled: bool) -> BackupConfig {
        let item = root.join("settings.yaml");
        std::fs::write(&item, "key: value").unwrap();
        BackupConfig {
            enabled,
            backup_on_boot: false,
            backup_path: root.join("backups"),
            hostname: Some("gotchi".to_string()),
            items: Some(vec![item]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_on_load_starts_scheduler() {
        let temp_dir = TempDir::new().unwrap();
        let manager = AutoBackupManager::on_load(test_config(temp_dir.path(), true)).unwrap();

        let status = manager.get_status();
        assert!(status.enabled);
        assert_eq!(status.scheduler.state, SchedulerState::Running);
        assert!(status.runner.last_backup_at.is_some());

        manager.on_unload().await;
        assert_eq!(manager.get_status().scheduler.state, SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_disabled_does_not_schedule() {
        let temp_dir = TempDir::new().unwrap();
        let manager = AutoBackupManager::on_load(test_config(temp_dir.path(), false)).unwrap();

        assert_eq!(manager.get_status().scheduler.state, SchedulerState::Stopped);

        // 手动触发仍然可用
        let outcome = manager.trigger_backup_manual().await;
        assert!(outcome.is_success());

        manager.on_unload().await;
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = BackupConfig {
            interval_hours: -1.0,
            ..Default::default()
        };
        assert!(AutoBackupManager::on_load(config).is_err());
    }

    #[tokio::test]
    async fn test_list_archives() {
        let temp_dir = TempDir::new().unwrap();
        let manager = AutoBackupManager::on_load(test_config(temp_dir.path(), false)).unwrap();

        assert!(manager.list_archives().await.unwrap().is_empty());

        let outcome = manager.trigger_backup_manual().await;
        let archive_path: PathBuf = outcome.run().unwrap().archive_path.clone().unwrap();

        let archives = manager.list_archives().await.unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(
            archives[0].name,
            archive_path.file_name().unwrap().to_string_lossy()
        );
        assert!(archives[0].size_bytes > 0);
    }
}
