//! 备份调度器
//!
//! 两条互相独立的触发路径，共用同一个备份执行器：
//! - 启动备份：启动后延迟 30 秒执行一次
//! - 定时轮询：启动后等待 60 秒，之后每 5 分钟检查一次是否到达备份间隔
//!
//! 状态机：`Stopped → Running → Stopping → Stopped`

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::autobackup::runner::{BackupRunner, TriggerSource};

/// 调度时间参数
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTimings {
    /// 启动备份延迟
    pub boot_delay: Duration,
    /// 轮询首次检查前的等待时间
    pub initial_delay: Duration,
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 轮询出错后的退避时间
    pub error_backoff: Duration,
    /// 停止时等待轮询任务退出的最长时间
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerTimings {
    fn default() -> Self {
        Self {
            boot_delay: Duration::from_secs(30),
            initial_delay: Duration::from_secs(60),
            poll_interval: Duration::from_secs(300),
            error_backoff: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// 未运行
    Stopped,
    /// 运行中
    Running,
    /// 正在停止
    Stopping,
}

/// 调度器状态快照
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    /// 当前状态
    pub state: SchedulerState,
    /// 已完成的轮询次数
    pub poll_count: u64,
}

/// 生命周期相关的可变状态
///
/// 状态与任务句柄在同一把锁下更新，启动和停止互斥
struct SchedulerInner {
    /// 当前状态
    state: SchedulerState,
    /// 取消令牌（每次启动重新创建）
    cancel_token: CancellationToken,
    /// 轮询任务句柄
    poll_handle: Option<JoinHandle<()>>,
    /// 启动备份任务句柄
    boot_handle: Option<JoinHandle<()>>,
}

/// 备份调度器
pub struct BackupScheduler {
    /// 备份执行器
    runner: Arc<BackupRunner>,
    /// 时间参数
    timings: SchedulerTimings,
    /// 生命周期状态
    inner: Mutex<SchedulerInner>,
    /// 轮询次数统计
    poll_count: Arc<AtomicU64>,
}

impl BackupScheduler {
    /// 创建新的调度器
    pub fn new(runner: Arc<BackupRunner>, timings: SchedulerTimings) -> Self {
        Self {
            runner,
            timings,
            inner: Mutex::new(SchedulerInner {
                state: SchedulerState::Stopped,
                cancel_token: CancellationToken::new(),
                poll_handle: None,
                boot_handle: None,
            }),
            poll_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 获取当前状态
    pub fn state(&self) -> SchedulerState {
        self.inner.lock().state
    }

    /// 获取状态快照
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state(),
            poll_count: self.poll_count.load(Ordering::Relaxed),
        }
    }

    /// 启动调度器
    ///
    /// 需要在 tokio 运行时中调用。已在运行时忽略。
    pub fn start(&self) {
        let runner = self.runner.clone();
        self.start_with(move || poll_once(runner.clone()));
    }

    /// 使用指定的单次轮询逻辑启动
    fn start_with<F, Fut>(&self, poll: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if inner.state != SchedulerState::Stopped {
            tracing::warn!("备份调度器已在运行（状态: {:?}），忽略启动请求", inner.state);
            return;
        }

        let token = CancellationToken::new();

        // 间隔计时从启动时刻开始，与启动备份是否成功无关
        self.runner.set_last_backup_at(Some(Utc::now()));

        if self.runner.config().backup_on_boot {
            tracing::info!("已安排启动备份，{:?} 后执行", self.timings.boot_delay);
            inner.boot_handle = Some(tokio::spawn(boot_backup(
                self.runner.clone(),
                self.timings.boot_delay,
                token.child_token(),
            )));
        }

        inner.poll_handle = Some(tokio::spawn(poll_loop(
            poll,
            self.timings,
            token.clone(),
            self.poll_count.clone(),
        )));
        inner.cancel_token = token;
        inner.state = SchedulerState::Running;
    }

    /// 停止调度器
    ///
    /// 轮询任务在下一个等待点退出；最多等待 `shutdown_timeout`，超时后放弃等待。
    /// 正在执行的备份不会被中断。
    pub async fn stop(&self) {
        let (poll_handle, boot_handle) = {
            let mut inner = self.inner.lock();
            if inner.state != SchedulerState::Running {
                return;
            }
            inner.state = SchedulerState::Stopping;
            inner.cancel_token.cancel();
            (inner.poll_handle.take(), inner.boot_handle.take())
        };

        tracing::info!("正在停止备份调度器");

        // 启动备份若尚未触发，会随令牌取消；已开始的备份继续完成
        drop(boot_handle);

        if let Some(handle) = poll_handle {
            let abort_handle = handle.abort_handle();
            match tokio::time::timeout(self.timings.shutdown_timeout, handle).await {
                Ok(Ok(())) => tracing::info!("后台定时器已停止"),
                Ok(Err(e)) => tracing::warn!("后台定时器异常退出: {}", e),
                Err(_) => {
                    tracing::warn!(
                        "等待后台定时器退出超时（{:?}），放弃等待",
                        self.timings.shutdown_timeout
                    );
                    abort_handle.abort();
                }
            }
        }

        self.inner.lock().state = SchedulerState::Stopped;
    }
}

/// 等待指定时间，期间被取消则返回 false
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;

        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// 启动备份任务
async fn boot_backup(runner: Arc<BackupRunner>, delay: Duration, token: CancellationToken) {
    if !sleep_or_cancel(&token, delay).await {
        tracing::info!("启动备份已取消");
        return;
    }
    runner.run_backup(TriggerSource::Boot).await;
}

/// 定时轮询主循环
///
/// 单次轮询出错（包括 panic）只记录日志并退避，循环本身不会退出，直到收到取消信号
async fn poll_loop<F, Fut>(
    poll: F,
    timings: SchedulerTimings,
    token: CancellationToken,
    poll_count: Arc<AtomicU64>,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tracing::info!("后台定时器已启动");

    if sleep_or_cancel(&token, timings.initial_delay).await {
        loop {
            let delay = match run_iteration(poll()).await {
                Ok(()) => timings.poll_interval,
                Err(e) => {
                    tracing::error!("定时器错误: {:#}", e);
                    timings.error_backoff
                }
            };
            poll_count.fetch_add(1, Ordering::Relaxed);

            if !sleep_or_cancel(&token, delay).await {
                break;
            }
        }
    }

    tracing::info!("后台定时器已退出");
}

/// 在独立任务中执行单次轮询，panic 转换为错误
async fn run_iteration<Fut>(iteration: Fut) -> anyhow::Result<()>
where
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(iteration)
        .await
        .context("定时轮询任务异常退出")?
}

/// 单次轮询：到达间隔则执行备份
async fn poll_once(runner: Arc<BackupRunner>) -> anyhow::Result<()> {
    if !runner.is_backup_due(Utc::now()) {
        return Ok(());
    }

    tracing::info!("定时触发备份");
    runner.run_backup(TriggerSource::Poll).await;
    Ok(())
}
