use backup_daemon::{build_router, AppConfig, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统（RUST_LOG 优先，默认 info）
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    info!("Backup Daemon v{} 启动中...", env!("CARGO_PKG_VERSION"));

    // 加载配置
    let config_path = AppConfig::config_path();
    let config = AppConfig::load_or_default(&config_path).await?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    // 创建应用状态（启动备份调度器）
    let app_state = AppState::new(config.backup)?;
    info!("应用状态初始化完成");

    let manager = app_state.autobackup_manager.clone();
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("服务器启动在: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 停止调度器（有限时间等待）
    manager.on_unload().await;
    info!("服务器已关闭");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    info!("收到退出信号，正在关闭...");
}
