//! 日志 target 常量，便于按模块过滤（例如 `RUST_LOG=candle_retention=debug`）

pub const CANDLE_AGGREGATOR: &str = "candle_aggregator";
pub const CANDLE_RETENTION: &str = "candle_retention";
pub const PERSISTENCE_SCHEDULER: &str = "persistence_scheduler";
pub const COLLECTOR_RUNTIME: &str = "collector_runtime";
pub const TICK_FEED: &str = "tick_feed";
