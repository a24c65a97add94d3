// 共享模块：错误、数据模型、配置与日志
pub mod config;
pub mod error;
pub mod log_targets;
pub mod logging_setup;
pub mod models;

// 重新导出常用类型，方便使用
pub use config::{CollectorConfig, RuntimeKind};
pub use error::{AppError, Result};
pub use models::{
    bucket_start, is_safe_asset_name, is_valid_tick_time, Candle, Snapshot, Tick, MAX_TICK_TIME_SECS, TIMEFRAME_SECS,
};
