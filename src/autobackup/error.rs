//! 备份错误处理模块
//!
//! 提供统一的错误分类和面向日志的错误消息

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// 备份错误
#[derive(Debug, Error)]
pub enum BackupError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 备份目录创建失败
    #[error("无法创建备份目录 {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 没有可备份的文件
    #[error("没有找到可备份的文件")]
    NothingToBackup,

    /// 同名归档已存在
    #[error("归档文件已存在（同一秒内只能生成一个备份，请稍后重试）: {0}")]
    ArchiveExists(PathBuf),

    /// 归档文件未生成
    #[error("归档文件未生成: {0}")]
    ArchiveMissing(PathBuf),

    /// 归档文件为空
    #[error("归档文件为空: {0}")]
    ArchiveEmpty(PathBuf),

    /// 权限错误
    #[error("权限错误: {0}")]
    PermissionDenied(String),

    /// 文件系统错误
    #[error("文件系统错误: {0}")]
    FileSystem(String),

    /// 内部错误（后台任务异常等）
    #[error("内部错误: {0}")]
    Internal(String),
}

impl BackupError {
    /// 获取错误分类
    pub fn category(&self) -> ErrorCategory {
        classify_error(self)
    }
}

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 配置/环境错误（本次备份中止）
    Configuration,
    /// 清单解析错误（没有可备份项）
    Resolution,
    /// 归档校验失败
    Verification,
    /// 权限错误
    Permission,
    /// 其他文件系统错误
    Resource,
    /// 内部错误
    Internal,
}

/// 错误分类函数
pub fn classify_error(error: &BackupError) -> ErrorCategory {
    match error {
        BackupError::Config(_) | BackupError::DirectoryCreate { .. } => {
            ErrorCategory::Configuration
        }
        BackupError::NothingToBackup => ErrorCategory::Resolution,
        BackupError::ArchiveExists(_)
        | BackupError::ArchiveMissing(_)
        | BackupError::ArchiveEmpty(_) => ErrorCategory::Verification,
        BackupError::PermissionDenied(_) => ErrorCategory::Permission,
        BackupError::FileSystem(_) => ErrorCategory::Resource,
        BackupError::Internal(_) => ErrorCategory::Internal,
    }
}

/// 从 std::io::Error 转换
impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => BackupError::PermissionDenied(err.to_string()),
            _ => BackupError::FileSystem(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            BackupError::NothingToBackup.category(),
            ErrorCategory::Resolution
        );
        assert_eq!(
            BackupError::ArchiveEmpty(PathBuf::from("/tmp/a.tar")).category(),
            ErrorCategory::Verification
        );

        let err = BackupError::DirectoryCreate {
            path: PathBuf::from("/backups"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "read-only"),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.to_string().contains("/backups"));
    }

    #[test]
    fn test_from_io_error() {
        let err: BackupError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, BackupError::PermissionDenied(_)));

        let err: BackupError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, BackupError::FileSystem(_)));
    }
}
