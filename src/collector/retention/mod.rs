//! 蜡烛保留策略
//!
//! 三种存储共用 [`CandleBook`] 的聚合逻辑，只在"完成的蜡烛去哪里"上不同：
//! - [`SlidingWindowStore`]：每品种最近N根，整份覆盖写
//! - [`RotatingDailyStore`]：追加到当天文件，清理其他日期的文件
//! - [`PruningArchiveStore`]：追加到全量归档，写回前裁剪过期蜡烛

pub mod pruning_archive;
pub mod rotating_daily;
pub mod sliding_window;

pub use pruning_archive::PruningArchiveStore;
pub use rotating_daily::RotatingDailyStore;
pub use sliding_window::SlidingWindowStore;

use crate::collector::candle_aggregator::{Admission, CandleBook};
use crate::collector::candle_file::CandleFile;
use crate::common::{
    log_targets::CANDLE_RETENTION, AppError, Candle, CollectorConfig, Result, RuntimeKind, Snapshot, Tick,
};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::Path;
use tracing::warn;

/// 单个品种的写入失败
#[derive(Debug)]
pub struct FlushFailure {
    pub asset: String,
    pub error: AppError,
}

/// 一次 flush 的结果，由调度器记录日志
#[derive(Debug, Default)]
pub struct FlushReport {
    /// 成功写入的品种数
    pub assets_written: usize,
    /// 成功写入的蜡烛数（追加型存储只计本次新增）
    pub candles_written: usize,
    /// 写入失败的品种；它们的 pending 队列保持不变，下一周期重试
    pub failures: Vec<FlushFailure>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, asset: &str, error: AppError) {
        warn!(
            target: CANDLE_RETENTION,
            event_name = "AssetFlushFailed",
            asset,
            error_type = error.get_error_type_summary(),
            retryable = error.is_retryable(),
            error = %error,
            "品种写入失败，保留待写队列到下一周期"
        );
        self.failures.push(FlushFailure {
            asset: asset.to_string(),
            error,
        });
    }
}

/// 保留策略的统一接口
///
/// 运行时独占一个存储实例，所有方法都在同一个任务里串行调用，不需要内部加锁。
pub trait RetentionStore: Send {
    /// 所属运行时
    fn kind(&self) -> RuntimeKind;

    /// 品种状态表（只读）
    fn book(&self) -> &CandleBook;

    /// 聚合一笔Tick
    fn admit(&mut self, tick: &Tick) -> Admission;

    /// 把内存状态写到磁盘
    fn flush(&mut self, now: DateTime<Utc>) -> FlushReport;

    /// 清理不再保留的文件，返回删除数量
    fn cleanup(&mut self, _now: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }

    /// 每个品种最近一根蜡烛：进行中的优先，否则最后完成的
    fn snapshot_view(&self) -> Snapshot {
        self.book()
            .iter()
            .filter_map(|(asset, state)| state.latest().map(|candle| (asset.clone(), *candle)))
            .collect()
    }
}

/// 按配置创建运行时对应的存储
pub fn build_store(kind: RuntimeKind, config: &CollectorConfig) -> Box<dyn RetentionStore> {
    match kind {
        RuntimeKind::Recent => Box::new(SlidingWindowStore::new(
            config.recent.data_dir.clone(),
            config.recent.max_candles,
        )),
        RuntimeKind::Daily => Box::new(RotatingDailyStore::new(config.daily.data_dir.clone())),
        RuntimeKind::Monthly => Box::new(PruningArchiveStore::new(
            config.monthly.data_dir.clone(),
            config.monthly.retention_days,
        )),
    }
}

/// 追加型存储共用的刷盘流程：读已有文件、追加 pending、过滤、写回、清空 pending
///
/// 单个品种失败不影响其他品种，失败品种的 pending 原样保留。
fn flush_appending(
    book: &mut CandleBook,
    dir: &Path,
    file_name: impl Fn(&str) -> String,
    keep: impl Fn(&Candle) -> bool,
) -> FlushReport {
    let mut report = FlushReport::default();

    for (asset, state) in book.iter_mut() {
        if state.pending.is_empty() {
            continue;
        }

        let path = dir.join(file_name(asset));
        match append_to_file(&path, &state.pending, &keep) {
            Ok(()) => {
                report.assets_written += 1;
                report.candles_written += state.pending.len();
                state.pending.clear();
            }
            Err(e) => report.record_failure(asset, e),
        }
    }

    report
}

fn append_to_file(path: &Path, pending: &VecDeque<Candle>, keep: &impl Fn(&Candle) -> bool) -> Result<()> {
    let mut candles = CandleFile::load(path)?.into_candles();
    candles.extend(pending.iter().copied());
    candles.retain(|candle| keep(candle));
    CandleFile::write(path, &candles)
}
