// src/bin/candle_collector.rs

use anyhow::{Context, Result};
use candle_collector::collector::CollectorRuntime;
use candle_collector::common::config::constants::DEFAULT_CONFIG_PATH;
use candle_collector::common::{logging_setup::init_logging, CollectorConfig, RuntimeKind};
use candle_collector::feed::{ChannelTickSource, TickFeed};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Collects live ticks into 1-minute candles under rolling, daily and archive retention.", long_about = None)]
struct Args {
    /// 配置文件路径，未指定时依次尝试 CONFIG_PATH 和 config/CollectorConfig.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 只运行指定的运行时，可重复 (recent | daily | monthly)
    #[arg(long = "only")]
    only: Vec<RuntimeKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. 加载配置；日志设置也在配置里，所以先于日志初始化
    let config_path = CollectorConfig::resolve_path(args.config.as_deref());
    let mut config = CollectorConfig::load(config_path.as_deref()).context("Failed to load collector configuration")?;
    config.restrict_to(&args.only).context("No runtime left to run after applying --only")?;
    config.validate().context("Invalid collector configuration")?;

    // 2. 初始化日志，guard 持有到进程结束
    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    let main_span = tracing::info_span!("candle_collector_app", version = env!("CARGO_PKG_VERSION"));
    let _enter = main_span.enter();

    match &config_path {
        Some(path) => info!(event_name = "ConfigFileLoading", path = %path.display()),
        None => warn!(
            event_name = "ConfigFileMissing",
            path = DEFAULT_CONFIG_PATH,
            "配置文件不存在，使用内置默认值"
        ),
    }

    let runtimes = config.enabled_runtimes();
    info!(
        event_name = "ConfigurationLoaded",
        ws_url = %config.source.ws_url,
        runtimes = ?runtimes.iter().map(RuntimeKind::as_str).collect::<Vec<_>>(),
        "Collector configuration loaded."
    );

    // 3. 每个运行时一个有界通道，行情源向所有通道复制Tick
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut senders = Vec::with_capacity(runtimes.len());
    let mut runtime_handles = Vec::with_capacity(runtimes.len());

    for kind in runtimes {
        let (sender, source) = ChannelTickSource::bounded(config.source.channel_capacity);
        senders.push(sender);

        let runtime = CollectorRuntime::from_config(kind, &config, source);
        let handle = tokio::spawn(runtime.run(shutdown_rx.clone()).in_current_span());
        runtime_handles.push((kind, handle));
        info!(event_name = "ModuleCreated", module = "CollectorRuntime", runtime = %kind);
    }

    let feed = TickFeed::from_config(&config.source, senders);
    let feed_handle = tokio::spawn(feed.run(shutdown_rx.clone()).in_current_span());
    info!(event_name = "ServicesStarted", "All collectors have been started.");

    // 4. 等待关闭信号
    wait_for_shutdown_signal().await;
    info!(event_name = "ShutdownSignalReceived", "Graceful shutdown initiated.");

    // 5. 广播关闭，运行时各自执行最后一轮持久化后退出
    if shutdown_tx.send(true).is_err() {
        warn!(event_name = "ShutdownBroadcastFailed", "所有任务都已退出");
    }

    if let Err(e) = feed_handle.await {
        error!(event_name = "TaskJoinFailed", task = "tick_feed", error = %e);
    }
    for (kind, handle) in runtime_handles {
        match handle.await {
            Ok(stats) => info!(event_name = "CollectorRuntimeJoined", runtime = %kind, ?stats),
            Err(e) => error!(event_name = "TaskJoinFailed", runtime = %kind, error = %e),
        }
    }

    info!(event_name = "ApplicationShutdownComplete");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM 信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(event_name = "SignalHandlerFailed", signal = "ctrl_c", error = %e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(event_name = "SignalHandlerFailed", signal = "sigterm", error = %e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
