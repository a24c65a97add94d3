//! 日志系统初始化
//!
//! 控制台输出始终开启；配置了 `log_dir` 时额外写入按天滚动的日志文件。

use crate::common::{config::LoggingConfig, AppError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "candle_collector.log";

/// 初始化日志/追踪系统
///
/// 返回的 guard 必须由 main 持有到进程结束，否则文件日志会丢失尾部。
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},tungstenite=warn,tokio_tungstenite=warn",
            config.log_level
        ))
    });

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_thread_ids(true).boxed()
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::ConfigError(format!("Failed to initialize tracing subscriber: {}", e)))?;

    Ok(guard)
}
