//! 滑动窗口存储：每品种保留最近N根蜡烛（含进行中的一根），每周期整份原子覆盖写

use super::{FlushReport, RetentionStore};
use crate::collector::candle_aggregator::{Admission, CandleBook};
use crate::collector::candle_file::AtomicFileWriter;
use crate::common::{log_targets::CANDLE_RETENTION, Candle, RuntimeKind, Tick};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::trace;

pub struct SlidingWindowStore {
    book: CandleBook,
    data_dir: PathBuf,
    capacity: usize,
}

impl SlidingWindowStore {
    pub fn new(data_dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            book: CandleBook::default(),
            data_dir: data_dir.into(),
            capacity: capacity.max(1),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 品种序列文件路径 `{asset}.json`
    pub fn series_path(&self, asset: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", asset))
    }

    /// 品种当前序列：已完成的蜡烛，末尾接进行中的蜡烛
    pub fn series(&self, asset: &str) -> Vec<Candle> {
        self.book
            .get(asset)
            .map(|state| state.pending.iter().chain(state.current.iter()).copied().collect())
            .unwrap_or_default()
    }
}

impl RetentionStore for SlidingWindowStore {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Recent
    }

    fn book(&self) -> &CandleBook {
        &self.book
    }

    fn admit(&mut self, tick: &Tick) -> Admission {
        let admission = self.book.admit(tick);
        if let Admission::Opened { .. } = admission {
            if let Some(state) = self.book.get_mut(&tick.asset) {
                // 进行中的蜡烛也占一个位置
                while state.pending.len() + usize::from(state.current.is_some()) > self.capacity {
                    if let Some(evicted) = state.pending.pop_front() {
                        trace!(target: CANDLE_RETENTION, asset = %tick.asset, time = evicted.time, "淘汰最旧蜡烛");
                    } else {
                        break;
                    }
                }
            }
        }
        admission
    }

    fn flush(&mut self, _now: DateTime<Utc>) -> FlushReport {
        let mut report = FlushReport::default();

        for (asset, state) in self.book.iter() {
            let series: Vec<Candle> = state.pending.iter().chain(state.current.iter()).copied().collect();
            if series.is_empty() {
                continue;
            }

            match AtomicFileWriter::write_json(self.series_path(asset), &series) {
                Ok(()) => {
                    report.assets_written += 1;
                    report.candles_written += series.len();
                }
                Err(e) => report.record_failure(asset, e),
            }
        }

        report
    }
}
