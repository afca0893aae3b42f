//! 备份保留策略
//!
//! 按修改时间保留最新的 `max_backups` 个归档，删除其余归档。
//! 单个文件删除失败只记录错误，不影响其他文件。

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use super::archive::{is_archive_name, FailedItem};
use super::error::BackupError;

/// 备份目录中的归档文件
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// 文件路径
    pub path: PathBuf,
    /// 修改时间
    pub modified: SystemTime,
}

/// 清理结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    /// 保留的归档数
    pub kept: usize,
    /// 已删除的归档
    pub deleted: Vec<PathBuf>,
    /// 删除失败的归档
    pub failed: Vec<FailedItem>,
}

/// 列出目录中的归档文件（最新的在前）
///
/// 修改时间相同时按文件名倒序，保证顺序稳定
pub fn list_archives(backup_dir: &Path) -> Result<Vec<ArchiveEntry>, BackupError> {
    let mut archives = Vec::new();

    for entry in std::fs::read_dir(backup_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if !is_archive_name(&name.to_string_lossy()) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("读取归档信息失败: {} - {}", entry.path().display(), e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        archives.push(ArchiveEntry {
            path: entry.path(),
            modified: metadata.modified()?,
        });
    }

    archives.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| b.path.cmp(&a.path))
    });

    Ok(archives)
}

/// 保留管理器
#[derive(Debug, Clone)]
pub struct RetentionManager {
    backup_dir: PathBuf,
    max_backups: usize,
}

impl RetentionManager {
    /// 创建新的保留管理器
    pub fn new(backup_dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            max_backups,
        }
    }

    /// 执行清理：保留最新的 `max_backups` 个归档
    pub fn enforce(&self) -> Result<RetentionReport, BackupError> {
        let archives = list_archives(&self.backup_dir)?;

        if archives.len() <= self.max_backups {
            return Ok(RetentionReport {
                kept: archives.len(),
                ..Default::default()
            });
        }

        tracing::info!(
            "保留最新的 {} 个备份，删除 {} 个旧备份",
            self.max_backups,
            archives.len() - self.max_backups
        );

        let mut report = RetentionReport {
            kept: self.max_backups,
            ..Default::default()
        };

        for archive in archives.into_iter().skip(self.max_backups) {
            match std::fs::remove_file(&archive.path) {
                Ok(()) => {
                    tracing::info!("已删除旧备份: {}", display_name(&archive.path));
                    report.deleted.push(archive.path);
                }
                Err(e) => {
                    tracing::error!("删除旧备份失败 {}: {}", archive.path.display(), e);
                    report.failed.push(FailedItem {
                        path: archive.path,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
