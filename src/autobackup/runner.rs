//! 备份执行器
//!
//! 负责单次备份的完整流程：
//! 确保目录 → 过滤备份清单 → 构建归档 → 更新备份时间 → 清理旧备份
//!
//! 同一时间只允许一个备份在执行。执行期间的其他触发直接跳过，不排队。
//! 任何失败（包括后台线程 panic）都会被转换为失败结果，不会传播给调用方。

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::archive::{ArchiveBuilder, FailedItem};
use super::config::BackupConfig;
use super::error::BackupError;
use super::filter::{ensure_backup_dir, resolve_items};
use super::retention::RetentionManager;

/// 触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// 启动备份
    Boot,
    /// 定时轮询触发
    Poll,
    /// 手动触发（webhook）
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Boot => write!(f, "boot"),
            TriggerSource::Poll => write!(f, "poll"),
            TriggerSource::Manual => write!(f, "manual"),
        }
    }
}

/// 单次备份记录
#[derive(Debug, Clone, Serialize)]
pub struct BackupRun {
    /// 触发来源
    pub trigger: TriggerSource,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 实际参与备份的路径
    pub items: Vec<PathBuf>,
    /// 归档文件路径
    pub archive_path: Option<PathBuf>,
    /// 是否成功
    pub success: bool,
    /// 归档大小（字节）
    pub size_bytes: u64,
    /// 添加失败的备份项
    pub failed_items: Vec<FailedItem>,
    /// 本次清理删除的旧归档数
    pub deleted_archives: usize,
    /// 失败原因
    pub error: Option<String>,
}

impl BackupRun {
    fn new(trigger: TriggerSource) -> Self {
        Self {
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            items: Vec::new(),
            archive_path: None,
            success: false,
            size_bytes: 0,
            failed_items: Vec::new(),
            deleted_archives: 0,
            error: None,
        }
    }
}

/// 备份结果
#[derive(Debug, Clone)]
pub enum BackupOutcome {
    /// 备份完成
    Completed(BackupRun),
    /// 备份失败
    Failed(BackupRun),
    /// 已有备份在执行，本次跳过
    Skipped,
}

impl BackupOutcome {
    /// 是否成功（跳过视为未成功）
    pub fn is_success(&self) -> bool {
        matches!(self, BackupOutcome::Completed(_))
    }

    /// 对应的备份记录
    pub fn run(&self) -> Option<&BackupRun> {
        match self {
            BackupOutcome::Completed(run) | BackupOutcome::Failed(run) => Some(run),
            BackupOutcome::Skipped => None,
        }
    }
}

/// 执行器状态（用于外部查询）
#[derive(Debug, Clone, Serialize)]
pub struct RunnerStatus {
    /// 是否正在执行
    pub is_running: bool,
    /// 最近一次备份时间（用于间隔判断）
    pub last_backup_at: Option<DateTime<Utc>>,
    /// 最后触发来源
    pub last_trigger_source: Option<TriggerSource>,
    /// 执行次数
    pub execution_count: u64,
    /// 跳过次数（执行期间收到的触发数）
    pub skipped_count: u64,
    /// 最近一次备份记录
    pub last_run: Option<BackupRun>,
}

/// 执行标志守卫
///
/// 丢弃时清除执行标志，正常返回、出错和 panic 都会经过这里
pub struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 备份执行器
pub struct BackupRunner {
    /// 备份配置
    config: BackupConfig,
    /// 备份清单
    items: Vec<PathBuf>,
    /// 归档构建器
    archive_builder: ArchiveBuilder,
    /// 保留管理器
    retention: RetentionManager,
    /// 是否正在执行
    running: Arc<AtomicBool>,
    /// 最近一次备份时间（None 表示从未备份）
    last_backup_at: RwLock<Option<DateTime<Utc>>>,
    /// 最近一次备份记录
    last_run: RwLock<Option<BackupRun>>,
    /// 最后触发来源
    last_trigger_source: RwLock<Option<TriggerSource>>,
    /// 执行次数统计
    execution_count: AtomicU64,
    /// 跳过次数统计
    skipped_count: AtomicU64,
}

impl BackupRunner {
    /// 创建新的备份执行器
    pub fn new(config: BackupConfig) -> Self {
        let hostname = config.resolve_hostname();
        let archive_builder =
            ArchiveBuilder::new(config.backup_path.clone(), hostname, config.compress);
        let retention = RetentionManager::new(config.backup_path.clone(), config.max_backups);

        Self {
            items: config.backup_items(),
            config,
            archive_builder,
            retention,
            running: Arc::new(AtomicBool::new(false)),
            last_backup_at: RwLock::new(None),
            last_run: RwLock::new(None),
            last_trigger_source: RwLock::new(None),
            execution_count: AtomicU64::new(0),
            skipped_count: AtomicU64::new(0),
        }
    }

    /// 获取配置
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// 获取备份清单
    pub fn items(&self) -> &[PathBuf] {
        &self.items
    }

    /// 检查是否正在执行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 最近一次备份时间
    pub fn last_backup_at(&self) -> Option<DateTime<Utc>> {
        *self.last_backup_at.read()
    }

    /// 设置最近一次备份时间
    ///
    /// 调度器启动时以当前时间作为间隔计时起点
    pub fn set_last_backup_at(&self, at: Option<DateTime<Utc>>) {
        *self.last_backup_at.write() = at;
    }

    /// 检查是否到达备份间隔
    pub fn is_backup_due(&self, now: DateTime<Utc>) -> bool {
        is_due(self.last_backup_at(), self.config.interval(), now)
    }

    /// 尝试获取执行权
    ///
    /// 已有备份在执行时返回 None
    pub fn try_begin(&self) -> Option<RunningGuard> {
        if self.running.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(RunningGuard {
            flag: self.running.clone(),
        })
    }

    fn skip(&self, trigger: TriggerSource) -> BackupOutcome {
        self.skipped_count.fetch_add(1, Ordering::Relaxed);
        tracing::info!("备份正在执行，跳过本次触发（来源: {}）", trigger);
        BackupOutcome::Skipped
    }

    /// 执行备份（异步入口）
    ///
    /// 归档和清理是阻塞 I/O，在 blocking 线程池中执行。
    /// 调用方 future 被丢弃时，已开始的备份仍会完成，执行标志随之释放。
    pub async fn run_backup(self: &Arc<Self>, trigger: TriggerSource) -> BackupOutcome {
        let guard = match self.try_begin() {
            Some(guard) => guard,
            None => return self.skip(trigger),
        };

        let runner = Arc::clone(self);
        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            runner.execute_guarded(trigger)
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("备份任务异常退出: {}", e);
                let mut run = BackupRun::new(trigger);
                run.finished_at = Some(Utc::now());
                run.error = Some(BackupError::Internal(e.to_string()).to_string());
                BackupOutcome::Failed(run)
            }
        }
    }

    /// 执行备份，panic 转换为失败结果
    fn execute_guarded(&self, trigger: TriggerSource) -> BackupOutcome {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.execute(trigger))) {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("备份失败: {}", message);

                let mut run = BackupRun::new(trigger);
                run.finished_at = Some(Utc::now());
                run.error = Some(BackupError::Internal(message).to_string());
                *self.last_run.write() = Some(run.clone());
                BackupOutcome::Failed(run)
            }
        }
    }

    fn execute(&self, trigger: TriggerSource) -> BackupOutcome {
        self.execution_count.fetch_add(1, Ordering::Relaxed);
        *self.last_trigger_source.write() = Some(trigger);

        tracing::info!("开始备份（触发来源: {}）", trigger);
        let start = std::time::Instant::now();

        let mut run = BackupRun::new(trigger);
        let result = self.perform(&mut run);
        run.finished_at = Some(Utc::now());

        let outcome = match result {
            Ok(()) => {
                run.success = true;
                tracing::info!(
                    "备份成功！大小: {:.2} MB，耗时 {:.2?}",
                    run.size_bytes as f64 / (1024.0 * 1024.0),
                    start.elapsed()
                );
                BackupOutcome::Completed(run.clone())
            }
            Err(e) => {
                tracing::error!("备份失败: {}", e);
                run.error = Some(e.to_string());
                BackupOutcome::Failed(run.clone())
            }
        };

        *self.last_run.write() = Some(run);
        outcome
    }

    fn perform(&self, run: &mut BackupRun) -> Result<(), BackupError> {
        ensure_backup_dir(&self.config.backup_path)?;

        let items = resolve_items(&self.items)?;
        run.items = items.clone();

        let archive = self.archive_builder.build(&items, &Local::now())?;
        run.archive_path = Some(archive.archive_path);
        run.size_bytes = archive.size_bytes;
        run.failed_items = archive.failed;

        self.set_last_backup_at(Some(Utc::now()));

        // 清理失败不影响本次备份结果
        match self.retention.enforce() {
            Ok(report) => run.deleted_archives = report.deleted.len(),
            Err(e) => tracing::error!("清理旧备份出错: {}", e),
        }

        Ok(())
    }

    /// 获取执行器状态
    pub fn status(&self) -> RunnerStatus {
        RunnerStatus {
            is_running: self.is_running(),
            last_backup_at: self.last_backup_at(),
            last_trigger_source: *self.last_trigger_source.read(),
            execution_count: self.execution_count.load(Ordering::Relaxed),
            skipped_count: self.skipped_count.load(Ordering::Relaxed),
            last_run: self.last_run.read().clone(),
        }
    }
}

/// 备份间隔判断
///
/// 从未备份时返回 false；时钟回拨时视为未到期
pub fn is_due(last_backup_at: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> bool {
    let Some(last) = last_backup_at else {
        return false;
    };
    match (now - last).to_std() {
        Ok(elapsed) => elapsed >= interval,
        Err(_) => false,
    }
}
