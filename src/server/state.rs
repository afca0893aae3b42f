// 应用状态

use std::sync::Arc;

use crate::autobackup::{AutoBackupManager, BackupConfig};

/// 应用状态（在各个 handler 之间共享）
#[derive(Clone)]
pub struct AppState {
    /// 自动备份管理器
    pub autobackup_manager: Arc<AutoBackupManager>,
}

impl AppState {
    /// 加载备份管理器并创建应用状态
    ///
    /// 需要在 tokio 运行时中调用（会启动调度器）
    pub fn new(config: BackupConfig) -> anyhow::Result<Self> {
        let autobackup_manager = AutoBackupManager::on_load(config)?;
        Ok(Self { autobackup_manager })
    }
}
