//! 归档存储：完成的蜡烛追加到 `{asset}_full_history.json`，每次写回前裁剪超出保留期的蜡烛

use super::{flush_appending, FlushReport, RetentionStore};
use crate::collector::candle_aggregator::{Admission, CandleBook};
use crate::common::{RuntimeKind, Tick};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

const SECS_PER_DAY: i64 = 24 * 3600;

pub struct PruningArchiveStore {
    book: CandleBook,
    data_dir: PathBuf,
    retention_days: u32,
}

impl PruningArchiveStore {
    pub fn new(data_dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            book: CandleBook::default(),
            data_dir: data_dir.into(),
            retention_days,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn archive_path(&self, asset: &str) -> PathBuf {
        self.data_dir.join(archive_file_name(asset))
    }

    /// 裁剪线：`time <= cutoff` 的蜡烛会被删除
    pub fn cutoff(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - i64::from(self.retention_days) * SECS_PER_DAY
    }
}

fn archive_file_name(asset: &str) -> String {
    format!("{}_full_history.json", asset)
}

impl RetentionStore for PruningArchiveStore {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Monthly
    }

    fn book(&self) -> &CandleBook {
        &self.book
    }

    fn admit(&mut self, tick: &Tick) -> Admission {
        self.book.admit(tick)
    }

    fn flush(&mut self, now: DateTime<Utc>) -> FlushReport {
        let cutoff = self.cutoff(now);
        flush_appending(
            &mut self.book,
            &self.data_dir,
            archive_file_name,
            |candle| candle.time > cutoff,
        )
    }
}
