//! 蜡烛文件读写
//!
//! - [`AtomicFileWriter`]：先写同目录临时文件再 rename，读者只会看到完整的旧内容或新内容
//! - [`CandleFile`]：读-改-写型文件（日文件/归档）的加载与普通写入

use crate::common::{log_targets::CANDLE_RETENTION, Candle, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 原子文件写入器
pub struct AtomicFileWriter;

impl AtomicFileWriter {
    /// 临时文件路径：目标路径加 `.tmp` 后缀，保证与目标同目录
    pub fn temp_path(path: &Path) -> PathBuf {
        let mut name: OsString = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// 原子写入字节
    pub fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;

        let tmp_path = Self::temp_path(path);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        debug!(target: CANDLE_RETENTION, path = %path.display(), bytes = bytes.len(), "原子写入完成");
        Ok(())
    }

    /// 序列化为JSON后原子写入
    pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        Self::write_atomic(path, &bytes)
    }
}

/// 读取已有文件的结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// 文件不存在
    Missing,
    /// 成功解析
    Loaded(Vec<Candle>),
    /// 文件存在但无法解析，按空处理（有损恢复）
    Corrupted(String),
}

impl LoadOutcome {
    /// 有损恢复：损坏与缺失都视为没有历史数据
    pub fn into_candles(self) -> Vec<Candle> {
        match self {
            LoadOutcome::Loaded(candles) => candles,
            LoadOutcome::Missing | LoadOutcome::Corrupted(_) => Vec::new(),
        }
    }
}

/// 读-改-写型蜡烛文件
pub struct CandleFile;

impl CandleFile {
    /// 加载已有蜡烛数组
    ///
    /// 解析失败不是错误：返回 [`LoadOutcome::Corrupted`] 并记录告警，调用方会用空数组覆盖它。
    /// 只有读取本身失败（权限等）才返回错误。
    pub fn load(path: impl AsRef<Path>) -> Result<LoadOutcome> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Vec<Candle>>(&bytes) {
            Ok(candles) => Ok(LoadOutcome::Loaded(candles)),
            Err(e) => {
                warn!(
                    target: CANDLE_RETENTION,
                    event_name = "CandleFileCorrupted",
                    path = %path.display(),
                    reason = %e,
                    "已有文件无法解析，按空文件处理，其中的历史数据将被覆盖"
                );
                Ok(LoadOutcome::Corrupted(e.to_string()))
            }
        }
    }

    /// 普通写入（非原子），写入中途崩溃可能留下损坏文件
    pub fn write(path: impl AsRef<Path>, candles: &[Candle]) -> Result<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let bytes = serde_json::to_vec(candles)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
