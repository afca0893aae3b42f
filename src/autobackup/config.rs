//! 备份配置数据结构

use serde::{Deserialize, Serialize};
use std::path::{Component, PathBuf};
use std::time::Duration;

use super::error::BackupError;

/// 设备默认备份清单
///
/// 配置文件、SSH 密钥、凭据文件、握手包目录和自定义插件目录
pub const DEFAULT_BACKUP_ITEMS: [&str; 17] = [
    "/etc/pwnagotchi/config.toml",
    "/etc/pwnagotchi/fingerprint",
    "/etc/pwnagotchi/id_rsa",
    "/etc/pwnagotchi/id_rsa.pub",
    "/etc/ssh/sshd_config",
    "/etc/ssh/ssh_config",
    "/home/pi/.bashrc",
    "/home/pi/.profile",
    "/home/pi/.wpa_sec_uploads",
    "/home/pi/handshakes",
    "/root/.bashrc",
    "/root/.profile",
    "/root/client_secrets.json",
    "/root/settings.yaml",
    "/root/.ssh",
    "/root/peers",
    "/usr/local/share/pwnagotchi/custom-plugins",
];

/// 备份配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// 是否启用定时备份
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 备份间隔（小时，可为小数）
    #[serde(default = "default_interval_hours")]
    pub interval_hours: f64,
    /// 备份文件存放目录
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,
    /// 最多保留的备份数量（0 表示全部删除）
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
    /// 是否使用 gzip 压缩
    #[serde(default = "default_true")]
    pub compress: bool,
    /// 启动后是否执行一次备份
    #[serde(default = "default_true")]
    pub backup_on_boot: bool,
    /// 归档文件名中的主机名（为空时读取系统主机名）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// 自定义备份清单（为空时使用设备默认清单）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<PathBuf>>,
}

fn default_true() -> bool {
    true
}

fn default_interval_hours() -> f64 {
    1.0
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("/home/pi/backups")
}

fn default_max_backups() -> usize {
    5
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: default_interval_hours(),
            backup_path: default_backup_path(),
            max_backups: default_max_backups(),
            compress: true,
            backup_on_boot: true,
            hostname: None,
            items: None,
        }
    }
}

impl BackupConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), BackupError> {
        if !self.interval_hours.is_finite() || self.interval_hours <= 0.0 {
            return Err(BackupError::Config(format!(
                "interval_hours 必须大于 0，当前: {}",
                self.interval_hours
            )));
        }
        if self.backup_path.as_os_str().is_empty() {
            return Err(BackupError::Config("backup_path 不能为空".to_string()));
        }
        if let Some(items) = &self.items {
            if let Some(relative) = items.iter().find(|p| !p.is_absolute()) {
                return Err(BackupError::Config(format!(
                    "备份项必须是绝对路径: {}",
                    relative.display()
                )));
            }
            // 归档条目名只保留普通路径段，`..` 会让条目指向错误的位置
            if let Some(unnormalized) = items.iter().find(|p| {
                p.components()
                    .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
            }) {
                return Err(BackupError::Config(format!(
                    "备份项路径不能包含 `.` 或 `..`: {}",
                    unnormalized.display()
                )));
            }
        }
        Ok(())
    }

    /// 备份间隔
    ///
    /// 超出 `Duration` 表示范围时按 `Duration::MAX` 处理（永不到期）
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_hours * 3600.0).unwrap_or(Duration::MAX)
    }

    /// 实际使用的备份清单
    pub fn backup_items(&self) -> Vec<PathBuf> {
        match &self.items {
            Some(items) => items.clone(),
            None => DEFAULT_BACKUP_ITEMS.iter().map(PathBuf::from).collect(),
        }
    }

    /// 实际使用的主机名
    pub fn resolve_hostname(&self) -> String {
        self.hostname
            .clone()
            .filter(|h| !h.trim().is_empty())
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| "localhost".to_string())
    }
}
