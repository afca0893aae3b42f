// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::autobackup::BackupConfig;

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "BACKUP_DAEMON_CONFIG";

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 备份配置
    #[serde(default)]
    pub backup: BackupConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// 配置文件路径（环境变量优先）
    pub fn config_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;
        config
            .backup
            .validate()
            .context("Invalid backup config")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }

    /// 加载配置，文件不存在时创建默认配置
    ///
    /// 文件存在但无法解析时返回错误，不会覆盖原文件
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            let config = Self::load_from_file(path).await?;
            tracing::info!("配置文件加载成功: {}", path);
            return Ok(config);
        }

        tracing::warn!("配置文件不存在，使用默认配置: {}", path);
        let default_config = Self::default();

        // 尝试保存默认配置
        if let Err(e) = default_config.save_to_file(path).await {
            tracing::error!("保存默认配置失败: {}", e);
        }

        Ok(default_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.backup.max_backups, 5);
        assert_eq!(config.backup.backup_path, PathBuf::from("/home/pi/backups"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut config = AppConfig::default();
        config.backup.max_backups = 3;
        config.backup.compress = false;
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.backup.max_backups, 3);
        assert!(!loaded.backup.compress);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[backup]\ninterval_hours = 6\n").unwrap();

        let loaded = AppConfig::load_from_file(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(loaded.backup.interval_hours, 6.0);
        assert!(loaded.backup.backup_on_boot);
        assert_eq!(loaded.server.port, 8080);
    }

    #[tokio::test]
    async fn test_load_or_default_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("app.toml");
        let path = path.to_str().unwrap();

        let config = AppConfig::load_or_default(path).await.unwrap();
        assert_eq!(config.backup.max_backups, 5);
        assert!(Path::new(path).exists());
    }

    #[tokio::test]
    async fn test_load_or_default_keeps_invalid_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[backup]\ninterval_hours = 0\n").unwrap();
        let path = temp_file.path().to_str().unwrap();

        assert!(AppConfig::load_or_default(path).await.is_err());
        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("interval_hours = 0"));
    }
}
