//! 共享数据模型：价格Tick与OHLC蜡烛

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 唯一支持的K线周期（秒）
pub const TIMEFRAME_SECS: i64 = 60;

/// 可接受的最大Tick时间戳：9999-12-31T23:59:59Z
pub const MAX_TICK_TIME_SECS: i64 = 253_402_300_799;

/// 品种名称最大长度
pub const MAX_ASSET_NAME_LEN: usize = 64;

/// 单条价格观测，只在内存中流转，从不直接落盘
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// 品种名称，例如 "EURUSD"
    pub asset: String,
    /// 成交价
    pub price: f64,
    /// Unix时间戳（秒）
    pub time: i64,
}

impl Tick {
    pub fn new(asset: impl Into<String>, price: f64, time: i64) -> Self {
        Self {
            asset: asset.into(),
            price,
            time,
        }
    }

    /// 品种、价格与时间都可以安全地进入聚合与落盘
    pub fn is_admissible(&self) -> bool {
        is_safe_asset_name(&self.asset) && self.price.is_finite() && is_valid_tick_time(self.time)
    }
}

/// 时间戳在 `0..=MAX_TICK_TIME_SECS` 内，分桶运算不会溢出
pub fn is_valid_tick_time(time: i64) -> bool {
    (0..=MAX_TICK_TIME_SECS).contains(&time)
}

/// 品种名称会直接拼进文件名，只接受不含路径成分的短名称
///
/// 允许 ASCII 字母数字与 `_ - . # +`，不能以 `.` 开头（排除 `.`、`..` 与隐藏文件）。
pub fn is_safe_asset_name(asset: &str) -> bool {
    !asset.is_empty()
        && asset.len() <= MAX_ASSET_NAME_LEN
        && !asset.starts_with('.')
        && asset
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '#' | '+'))
}

/// 一个固定周期内所有Tick的OHLC聚合
///
/// `time` 是周期起点，始终是 [`TIMEFRAME_SECS`] 的整数倍。
/// 落盘格式就是这个结构的JSON形式：`{"time":..,"open":..,"high":..,"low":..,"close":..}`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    /// 由一笔价格开出新蜡烛
    pub fn open_at(time: i64, price: f64) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    /// 同一周期内的后续价格
    pub fn apply_price(&mut self, price: f64) {
        self.close = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
    }
}

/// 每个品种最近一根蜡烛；按品种名排序以保证序列化结果稳定
pub type Snapshot = BTreeMap<String, Candle>;

/// 计算时间戳所属周期的起点
///
/// 超出范围的时间戳饱和而不是溢出；入口处已按 [`is_valid_tick_time`] 过滤。
pub fn bucket_start(time: i64, timeframe_secs: i64) -> i64 {
    time.div_euclid(timeframe_secs).saturating_mul(timeframe_secs)
}
