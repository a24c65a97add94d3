//! 日文件存储：完成的蜡烛追加到 `{asset}_{YYYY-MM-DD}.json`，清理时删除其他日期的文件

use super::{flush_appending, FlushReport, RetentionStore};
use crate::collector::candle_aggregator::{Admission, CandleBook};
use crate::common::{log_targets::CANDLE_RETENTION, Result, RuntimeKind, Tick};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct RotatingDailyStore {
    book: CandleBook,
    data_dir: PathBuf,
}

impl RotatingDailyStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            book: CandleBook::default(),
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// UTC日期串，文件名与清理共用
    pub fn date_tag(now: DateTime<Utc>) -> String {
        now.format("%Y-%m-%d").to_string()
    }

    pub fn daily_path(&self, asset: &str, now: DateTime<Utc>) -> PathBuf {
        self.data_dir.join(daily_file_name(asset, &Self::date_tag(now)))
    }
}

fn daily_file_name(asset: &str, date: &str) -> String {
    format!("{}_{}.json", asset, date)
}

impl RetentionStore for RotatingDailyStore {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Daily
    }

    fn book(&self) -> &CandleBook {
        &self.book
    }

    fn admit(&mut self, tick: &Tick) -> Admission {
        self.book.admit(tick)
    }

    fn flush(&mut self, now: DateTime<Utc>) -> FlushReport {
        let date = Self::date_tag(now);
        flush_appending(
            &mut self.book,
            &self.data_dir,
            |asset| daily_file_name(asset, &date),
            |_| true,
        )
    }

    /// 删除目录中文件名不含当天日期的所有文件
    fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let date = Self::date_tag(now);
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().contains(&date) {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(target: CANDLE_RETENTION, path = %path.display(), "删除过期日文件");
                    removed += 1;
                }
                Err(e) => {
                    warn!(target: CANDLE_RETENTION, event_name = "StaleFileRemoveFailed", path = %path.display(), error = %e);
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::candle_file::{CandleFile, LoadOutcome};
    use crate::common::Candle;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_flush_appends_and_clears_pending() {
        let dir = tempdir().unwrap();
        let mut store = RotatingDailyStore::new(dir.path());
        let now = day(2024, 3, 5);

        for i in 0..3i64 {
            store.admit(&Tick::new("EURUSD", 1.0 + i as f64, i * 60));
        }
        let report = store.flush(now);
        assert_eq!(report.candles_written, 2);
        assert!(store.book().get("EURUSD").unwrap().pending.is_empty());

        store.admit(&Tick::new("EURUSD", 4.0, 180));
        store.flush(now);

        let path = store.daily_path("EURUSD", now);
        assert!(path.ends_with("EURUSD_2024-03-05.json"));
        let times: Vec<i64> = CandleFile::load(&path).unwrap().into_candles().iter().map(|c| c.time).collect();
        assert_eq!(times, vec![0, 60, 120]);
    }

    #[test]
    fn test_flush_without_pending_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut store = RotatingDailyStore::new(dir.path().join("24h"));
        store.admit(&Tick::new("EURUSD", 1.0, 0));

        let report = store.flush(day(2024, 3, 5));
        assert_eq!(report.assets_written, 0);
        assert!(!dir.path().join("24h").exists());
    }

    #[test]
    fn test_cleanup_keeps_only_current_date() {
        let dir = tempdir().unwrap();
        let mut store = RotatingDailyStore::new(dir.path());
        fs::write(dir.path().join("EURUSD_2024-03-04.json"), b"[]").unwrap();
        fs::write(dir.path().join("GBPUSD_2024-03-01.json"), b"[]").unwrap();
        fs::write(dir.path().join("notes.txt"), b"stray").unwrap();

        let now = day(2024, 3, 5);
        store.admit(&Tick::new("EURUSD", 1.0, 0));
        store.admit(&Tick::new("EURUSD", 1.1, 60));
        store.flush(now);
        let removed = store.cleanup(now).unwrap();

        assert_eq!(removed, 3);
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["EURUSD_2024-03-05.json".to_string()]);
        assert!(names.iter().all(|name| name.contains("2024-03-05")));
    }

    #[test]
    fn test_cleanup_on_missing_dir() {
        let dir = tempdir().unwrap();
        let mut store = RotatingDailyStore::new(dir.path().join("absent"));
        assert_eq!(store.cleanup(day(2024, 3, 5)).unwrap(), 0);
    }

    #[test]
    fn test_corrupted_daily_file_is_replaced_by_pending() {
        let dir = tempdir().unwrap();
        let now = day(2024, 3, 5);
        let mut store = RotatingDailyStore::new(dir.path());
        let path = store.daily_path("EURUSD", now);
        fs::write(&path, b"{not json").unwrap();

        store.admit(&Tick::new("EURUSD", 1.0, 0));
        store.admit(&Tick::new("EURUSD", 2.0, 60));
        let report = store.flush(now);

        assert!(report.is_clean());
        assert_eq!(
            CandleFile::load(&path).unwrap(),
            LoadOutcome::Loaded(vec![Candle::open_at(0, 1.0)])
        );
    }

    #[test]
    fn test_write_failure_keeps_pending() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let mut store = RotatingDailyStore::new(&blocker);

        store.admit(&Tick::new("EURUSD", 1.0, 0));
        store.admit(&Tick::new("EURUSD", 2.0, 60));
        store.admit(&Tick::new("GBPUSD", 3.0, 0));
        store.admit(&Tick::new("GBPUSD", 4.0, 60));
        let before = store.book().get("EURUSD").unwrap().pending.clone();

        let report = store.flush(day(2024, 3, 5));
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.assets_written, 0);
        assert_eq!(store.book().get("EURUSD").unwrap().pending, before);
    }

    #[test]
    fn test_traversal_asset_never_leaves_data_dir() {
        let dir = tempdir().unwrap();
        let mut store = RotatingDailyStore::new(dir.path().join("24h"));
        for i in 0..3i64 {
            assert_eq!(store.admit(&Tick::new("../escaped", 1.0, i * 60)), Admission::Dropped);
        }

        let report = store.flush(day(2024, 3, 5));
        assert_eq!(report.assets_written, 0);
        assert!(store.book().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_snapshot_view_reports_latest_candle() {
        let dir = tempdir().unwrap();
        let mut store = RotatingDailyStore::new(dir.path());
        store.admit(&Tick::new("EURUSD", 1.0, 0));
        store.admit(&Tick::new("EURUSD", 2.0, 60));
        assert_eq!(store.snapshot_view()["EURUSD"], Candle::open_at(60, 2.0));
    }
}
