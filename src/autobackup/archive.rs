//! 归档构建
//!
//! 把备份项写入 `{hostname}_backup_{YYYYMMDD_HHMMSS}.tar[.gz]`：
//! - 归档内保留原始路径（去掉根目录前缀），在 `/` 下解包即可还原
//! - 单个备份项失败只记录警告，不影响整个归档
//! - 写入完成后以文件存在且非空作为成功标准

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use super::error::BackupError;

/// 归档文件扩展名（保留策略据此识别归档）
pub const ARCHIVE_EXTENSIONS: [&str; 2] = [".tar.gz", ".tar"];

/// 添加失败的备份项
#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    /// 备份项路径
    pub path: PathBuf,
    /// 失败原因
    pub error: String,
}

/// 归档结果
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    /// 归档文件路径
    pub archive_path: PathBuf,
    /// 成功写入的备份项
    pub added: Vec<PathBuf>,
    /// 写入失败的备份项
    pub failed: Vec<FailedItem>,
    /// 归档文件大小（字节）
    pub size_bytes: u64,
}

/// 归档构建器
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    backup_dir: PathBuf,
    hostname: String,
    compress: bool,
}

impl ArchiveBuilder {
    /// 创建新的归档构建器
    pub fn new(backup_dir: impl Into<PathBuf>, hostname: impl Into<String>, compress: bool) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            hostname: hostname.into(),
            compress,
        }
    }

    /// 生成归档文件名
    pub fn archive_name(&self, at: &DateTime<Local>) -> String {
        let extension = if self.compress { "tar.gz" } else { "tar" };
        format!(
            "{}_backup_{}.{}",
            self.hostname,
            at.format("%Y%m%d_%H%M%S"),
            extension
        )
    }

    /// 生成归档文件完整路径
    pub fn archive_path(&self, at: &DateTime<Local>) -> PathBuf {
        self.backup_dir.join(self.archive_name(at))
    }

    /// 构建归档
    ///
    /// 备份目录需要已经存在。同名归档已存在时返回 `ArchiveExists`，不会覆盖。
    pub fn build(&self, items: &[PathBuf], at: &DateTime<Local>) -> Result<ArchiveOutcome, BackupError> {
        let archive_path = self.archive_path(at);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&archive_path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => {
                    tracing::warn!(
                        "同名归档已存在（同一秒内重复触发？），本次不覆盖: {}",
                        archive_path.display()
                    );
                    BackupError::ArchiveExists(archive_path.clone())
                }
                _ => BackupError::from(e),
            })?;

        tracing::info!("创建备份: {}", archive_path.display());
        tracing::info!("正在备份 {} 项...", items.len());

        let written = if self.compress {
            write_archive(GzEncoder::new(file, Compression::default()), items)
                .and_then(|(encoder, added, failed)| Ok((encoder.finish()?, added, failed)))
        } else {
            write_archive(file, items)
        };

        let (added, failed) = match written.and_then(|(mut file, added, failed)| {
            file.flush()?;
            file.sync_all()?;
            Ok((added, failed))
        }) {
            Ok(result) => result,
            Err(e) => {
                // 未完成的归档不能留在目录里参与保留策略
                if let Err(remove_err) = std::fs::remove_file(&archive_path) {
                    tracing::warn!(
                        "清理未完成的归档失败: {} - {}",
                        archive_path.display(),
                        remove_err
                    );
                }
                return Err(e.into());
            }
        };

        let size_bytes = verify_archive(&archive_path)?;

        Ok(ArchiveOutcome {
            archive_path,
            added,
            failed,
            size_bytes,
        })
    }
}

/// 写入所有备份项并结束 tar 流，返回底层写入器
fn write_archive<W: Write>(
    writer: W,
    items: &[PathBuf],
) -> io::Result<(W, Vec<PathBuf>, Vec<FailedItem>)> {
    let mut builder = tar::Builder::new(writer);
    // 符号链接按链接本身保存
    builder.follow_symlinks(false);

    let mut added = Vec::with_capacity(items.len());
    let mut failed = Vec::new();

    for item in items {
        match append_item(&mut builder, item) {
            Ok(()) => {
                tracing::debug!("已添加: {}", item.display());
                added.push(item.clone());
            }
            Err(e) => {
                tracing::warn!("添加失败 {}: {}", item.display(), e);
                failed.push(FailedItem {
                    path: item.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let writer = builder.into_inner()?;
    Ok((writer, added, failed))
}

fn append_item<W: Write>(builder: &mut tar::Builder<W>, item: &Path) -> io::Result<()> {
    let name = entry_name(item);
    if name.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "无法作为归档条目的路径",
        ));
    }

    let metadata = std::fs::symlink_metadata(item)?;
    if metadata.is_dir() {
        builder.append_dir_all(&name, item)
    } else {
        builder.append_path_with_name(item, &name)
    }
}

/// 归档内的条目名：原始路径去掉根目录前缀
pub fn entry_name(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// 校验归档：必须存在且非空，返回文件大小
pub fn verify_archive(path: &Path) -> Result<u64, BackupError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => return Err(BackupError::ArchiveMissing(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BackupError::ArchiveMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if metadata.len() == 0 {
        return Err(BackupError::ArchiveEmpty(path.to_path_buf()));
    }

    Ok(metadata.len())
}

/// 判断文件名是否为归档文件
pub fn is_archive_name(name: &str) -> bool {
    ARCHIVE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
