//! 备份清单过滤
//!
//! 将配置的备份清单解析为当前实际存在的路径

use std::path::{Path, PathBuf};

use super::error::BackupError;

/// 保留存在的路径（保持原有顺序）
///
/// 不存在的路径只记录 debug 日志，不视为错误
pub fn existing_items<P: AsRef<Path>>(items: &[P]) -> Vec<PathBuf> {
    items
        .iter()
        .map(AsRef::as_ref)
        .filter(|item| {
            let exists = item.exists();
            if !exists {
                tracing::debug!("跳过不存在的备份项: {}", item.display());
            }
            exists
        })
        .map(Path::to_path_buf)
        .collect()
}

/// 解析备份清单
///
/// 结果为空时返回 `NothingToBackup`
pub fn resolve_items<P: AsRef<Path>>(items: &[P]) -> Result<Vec<PathBuf>, BackupError> {
    let existing = existing_items(items);
    if existing.is_empty() {
        return Err(BackupError::NothingToBackup);
    }
    tracing::debug!("备份清单: {}/{} 项存在", existing.len(), items.len());
    Ok(existing)
}

/// 确保备份目录存在
pub fn ensure_backup_dir(path: &Path) -> Result<(), BackupError> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|source| BackupError::DirectoryCreate {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("已创建备份目录: {}", path.display());
    Ok(())
}
