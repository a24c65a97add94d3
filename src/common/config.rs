//! 采集系统配置模块

use crate::common::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// 系统配置常量
pub mod constants {
    /// 默认配置文件路径
    pub const DEFAULT_CONFIG_PATH: &str = "config/CollectorConfig.toml";

    /// 默认行情源地址
    pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws";

    /// 滑动窗口每个品种保留的最大蜡烛数
    pub const DEFAULT_MAX_CANDLES: usize = 600;

    /// 月度归档保留天数
    pub const DEFAULT_RETENTION_DAYS: u32 = 30;

    /// 断线重连等待（秒）
    pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
}

use constants::*;

/// 三种采集运行时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// 最近600根蜡烛的滑动窗口 + 实时快照
    Recent,
    /// 只保留当天的日文件
    Daily,
    /// 30天滚动归档
    Monthly,
}

impl RuntimeKind {
    pub const ALL: [RuntimeKind; 3] = [RuntimeKind::Recent, RuntimeKind::Daily, RuntimeKind::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Recent => "recent",
            RuntimeKind::Daily => "daily",
            RuntimeKind::Monthly => "monthly",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recent" => Ok(RuntimeKind::Recent),
            "daily" | "24h" => Ok(RuntimeKind::Daily),
            "monthly" | "archive" => Ok(RuntimeKind::Monthly),
            other => Err(format!("unknown runtime '{}', expected recent|daily|monthly", other)),
        }
    }
}

/// 采集系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// 行情源配置
    pub source: SourceConfig,

    /// 滑动窗口运行时
    pub recent: RecentConfig,

    /// 日文件运行时
    pub daily: DailyConfig,

    /// 归档运行时
    pub monthly: MonthlyConfig,

    /// 日志配置
    pub logging: LoggingConfig,
}

/// 行情源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// WebSocket地址
    pub ws_url: String,

    /// 断线后重连等待（秒）
    pub reconnect_delay_secs: u64,

    /// 每个运行时的Tick通道容量
    pub channel_capacity: usize,
}

/// 滑动窗口运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentConfig {
    pub enabled: bool,

    /// 每品种完整序列文件所在目录
    pub data_dir: PathBuf,

    /// 每品种最多保留的蜡烛数（含进行中的一根）
    pub max_candles: usize,

    /// 全量序列保存间隔（秒）
    pub save_interval_secs: u64,

    /// 实时快照文件路径
    pub snapshot_path: PathBuf,

    /// 实时快照写入间隔（秒）
    pub snapshot_interval_secs: u64,
}

/// 日文件运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    pub enabled: bool,
    pub data_dir: PathBuf,

    /// 刷盘+清理间隔（秒）
    pub flush_interval_secs: u64,
}

/// 归档运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlyConfig {
    pub enabled: bool,
    pub data_dir: PathBuf,

    /// 刷盘+裁剪间隔（秒）
    pub flush_interval_secs: u64,

    /// 归档保留天数
    pub retention_days: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)，RUST_LOG 优先
    pub log_level: String,

    /// 滚动日志文件目录；为空时只输出到控制台
    pub log_dir: Option<PathBuf>,

    /// 是否输出JSON格式
    pub json: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            channel_capacity: 4096,
        }
    }
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("data/recent"),
            max_candles: DEFAULT_MAX_CANDLES,
            save_interval_secs: 10,
            snapshot_path: PathBuf::from("data/live_snapshot.json"),
            snapshot_interval_secs: 2,
        }
    }
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("data/24h"),
            flush_interval_secs: 30,
        }
    }
}

impl Default for MonthlyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("data/monthly"),
            flush_interval_secs: 60,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
            json: false,
        }
    }
}

impl CollectorConfig {
    /// 从文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// 按 CLI参数 > CONFIG_PATH > 默认路径 的顺序确定配置文件
    ///
    /// 返回 `None` 表示默认路径也不存在，应使用内置默认值。
    pub fn resolve_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
        explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from))
            .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|path| path.exists()))
    }

    /// 加载 `resolve_path` 得到的文件，再应用环境变量覆盖并校验
    ///
    /// 这里还没有日志订阅者，加载来源由调用方在日志初始化后记录。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 环境变量覆盖，WS_URL 与原采集脚本保持一致
    pub fn apply_env_overrides(&mut self) {
        if let Ok(ws_url) = std::env::var("WS_URL") {
            if !ws_url.trim().is_empty() {
                self.source.ws_url = ws_url.trim().to_string();
            }
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.source.ws_url)?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(AppError::ConfigError(format!(
                "行情源地址必须是ws或wss: {}",
                self.source.ws_url
            )));
        }

        if self.source.channel_capacity == 0 {
            return Err(AppError::ConfigError("Tick通道容量必须大于0".to_string()));
        }

        if self.recent.enabled {
            if self.recent.max_candles == 0 {
                return Err(AppError::ConfigError("max_candles必须大于0".to_string()));
            }
            if self.recent.save_interval_secs == 0 || self.recent.snapshot_interval_secs == 0 {
                return Err(AppError::ConfigError("recent的保存间隔必须大于0".to_string()));
            }
        }

        if self.daily.enabled && self.daily.flush_interval_secs == 0 {
            return Err(AppError::ConfigError("daily的刷盘间隔必须大于0".to_string()));
        }

        if self.monthly.enabled {
            if self.monthly.flush_interval_secs == 0 {
                return Err(AppError::ConfigError("monthly的刷盘间隔必须大于0".to_string()));
            }
            if self.monthly.retention_days == 0 {
                return Err(AppError::ConfigError("retention_days必须大于0".to_string()));
            }
        }

        if self.enabled_runtimes().is_empty() {
            return Err(AppError::ConfigError("至少需要启用一个运行时".to_string()));
        }

        self.validate_storage_layout()
    }

    /// 各运行时独占自己的目录：日文件清理会删除目录里所有非当天的文件
    fn validate_storage_layout(&self) -> Result<()> {
        let cwd = std::env::current_dir()?;
        let mut dirs: Vec<(RuntimeKind, PathBuf)> = Vec::new();

        for kind in self.enabled_runtimes() {
            let dir = normalize_path(&cwd, self.data_dir(kind));
            if cwd.starts_with(&dir) {
                return Err(AppError::ConfigError(format!(
                    "{}的数据目录不能是当前目录或其上级: {}",
                    kind,
                    self.data_dir(kind).display()
                )));
            }
            if let Some((other, _)) = dirs.iter().find(|(_, seen)| seen.starts_with(&dir) || dir.starts_with(seen)) {
                return Err(AppError::ConfigError(format!(
                    "{}与{}的数据目录重叠: {}",
                    kind,
                    other,
                    self.data_dir(kind).display()
                )));
            }
            dirs.push((kind, dir));
        }

        if self.recent.enabled {
            let snapshot = normalize_path(&cwd, &self.recent.snapshot_path);
            if let Some((kind, _)) = dirs.iter().find(|(_, dir)| snapshot.starts_with(dir)) {
                return Err(AppError::ConfigError(format!(
                    "实时快照不能放在{}的数据目录里: {}",
                    kind,
                    self.recent.snapshot_path.display()
                )));
            }
        }

        Ok(())
    }

    pub fn data_dir(&self, kind: RuntimeKind) -> &Path {
        match kind {
            RuntimeKind::Recent => &self.recent.data_dir,
            RuntimeKind::Daily => &self.daily.data_dir,
            RuntimeKind::Monthly => &self.monthly.data_dir,
        }
    }

    pub fn is_enabled(&self, kind: RuntimeKind) -> bool {
        match kind {
            RuntimeKind::Recent => self.recent.enabled,
            RuntimeKind::Daily => self.daily.enabled,
            RuntimeKind::Monthly => self.monthly.enabled,
        }
    }

    /// 只保留列表中的运行时，其余禁用；空列表表示不过滤
    ///
    /// 过滤后没有任何运行时启用时返回错误。
    pub fn restrict_to(&mut self, kinds: &[RuntimeKind]) -> Result<()> {
        if kinds.is_empty() {
            return Ok(());
        }
        self.recent.enabled &= kinds.contains(&RuntimeKind::Recent);
        self.daily.enabled &= kinds.contains(&RuntimeKind::Daily);
        self.monthly.enabled &= kinds.contains(&RuntimeKind::Monthly);

        if self.enabled_runtimes().is_empty() {
            return Err(AppError::ConfigError(format!(
                "--only {:?} 过滤后没有启用的运行时",
                kinds.iter().map(RuntimeKind::as_str).collect::<Vec<_>>()
            )));
        }
        Ok(())
    }

    pub fn enabled_runtimes(&self) -> Vec<RuntimeKind> {
        RuntimeKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

/// 按词法规整为绝对路径，不访问文件系统，目录可以尚未创建
fn normalize_path(base: &Path, path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_collector_layout() {
        let config = CollectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recent.max_candles, 600);
        assert_eq!(config.recent.save_interval_secs, 10);
        assert_eq!(config.recent.snapshot_interval_secs, 2);
        assert_eq!(config.daily.flush_interval_secs, 30);
        assert_eq!(config.monthly.flush_interval_secs, 60);
        assert_eq!(config.monthly.retention_days, 30);
        assert_eq!(config.enabled_runtimes(), RuntimeKind::ALL.to_vec());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: CollectorConfig = toml::from_str(
            r#"
            [source]
            ws_url = "wss://feed.example.com/ws"

            [monthly]
            retention_days = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.source.ws_url, "wss://feed.example.com/ws");
        assert_eq!(config.source.reconnect_delay_secs, 5);
        assert_eq!(config.monthly.retention_days, 7);
        assert_eq!(config.monthly.data_dir, PathBuf::from("data/monthly"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_http_url() {
        let mut config = CollectorConfig::default();
        config.source.ws_url = "http://127.0.0.1:8000/ws".to_string();
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        config.source.ws_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(AppError::UrlParseError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = CollectorConfig::default();
        config.recent.max_candles = 0;
        assert!(config.validate().is_err());

        let mut config = CollectorConfig::default();
        config.monthly.retention_days = 0;
        assert!(config.validate().is_err());

        // 禁用的运行时不参与校验
        let mut config = CollectorConfig::default();
        config.daily.enabled = false;
        config.daily.flush_interval_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_restrict_to_subset() {
        let mut config = CollectorConfig::default();
        config.restrict_to(&[]).unwrap();
        assert_eq!(config.enabled_runtimes(), RuntimeKind::ALL.to_vec());

        config.restrict_to(&[RuntimeKind::Daily]).unwrap();
        assert_eq!(config.enabled_runtimes(), vec![RuntimeKind::Daily]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_restrict_to_nothing_left_is_an_error() {
        let mut config = CollectorConfig::default();
        config.monthly.enabled = false;
        let err = config.restrict_to(&[RuntimeKind::Monthly]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ref msg) if msg.contains("monthly")));
        assert!(config.enabled_runtimes().is_empty());
    }

    #[test]
    fn test_invalid_interval_is_not_reported_as_empty_filter() {
        let mut config = CollectorConfig::default();
        config.daily.flush_interval_secs = 0;
        config.restrict_to(&[RuntimeKind::Daily]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(ref msg) if msg.contains("daily")));
    }

    #[test]
    fn test_validate_rejects_shared_store_dir() {
        let mut config = CollectorConfig::default();
        config.recent.data_dir = PathBuf::from("shared");
        config.daily.data_dir = PathBuf::from("shared");
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        // 写法不同但指向同一目录
        config.recent.data_dir = PathBuf::from("./shared/");
        config.daily.data_dir = PathBuf::from("data/../shared");
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        // 禁用的运行时不占用目录
        config.recent.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nested_store_dirs() {
        let mut config = CollectorConfig::default();
        config.daily.data_dir = PathBuf::from("data");
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        let mut config = CollectorConfig::default();
        config.monthly.data_dir = PathBuf::from("data/24h/archive");
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_snapshot_inside_store_dir() {
        let mut config = CollectorConfig::default();
        config.recent.snapshot_path = PathBuf::from("data/24h/live_snapshot.json");
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        config.recent.snapshot_path = PathBuf::from("data/recent/live_snapshot.json");
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));

        config.recent.snapshot_path = PathBuf::from("data/live_snapshot.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_working_dir_as_store_dir() {
        for dir in [".", "", "data/..", ".."] {
            let mut config = CollectorConfig::default();
            config.daily.data_dir = PathBuf::from(dir);
            assert!(matches!(config.validate(), Err(AppError::ConfigError(_))), "{:?}", dir);
        }
    }

    #[test]
    fn test_normalize_path_is_lexical() {
        let base = Path::new("/srv/collector");
        assert_eq!(normalize_path(base, Path::new("./data/24h/")), PathBuf::from("/srv/collector/data/24h"));
        assert_eq!(normalize_path(base, Path::new("data/../shared")), PathBuf::from("/srv/collector/shared"));
        assert_eq!(normalize_path(base, Path::new("/var/lib/candles")), PathBuf::from("/var/lib/candles"));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.toml");
        std::fs::write(&path, "[monthly]\nretention_days = 7\n").unwrap();

        assert_eq!(CollectorConfig::resolve_path(Some(&path)), Some(path.clone()));
        assert_eq!(CollectorConfig::load(Some(&path)).unwrap().monthly.retention_days, 7);
        assert!(matches!(
            CollectorConfig::load(Some(&dir.path().join("absent.toml"))),
            Err(AppError::IoError(_))
        ));
    }

    #[test]
    fn test_runtime_kind_parsing() {
        assert_eq!("recent".parse::<RuntimeKind>(), Ok(RuntimeKind::Recent));
        assert_eq!("24h".parse::<RuntimeKind>(), Ok(RuntimeKind::Daily));
        assert_eq!("Monthly".parse::<RuntimeKind>(), Ok(RuntimeKind::Monthly));
        assert!("weekly".parse::<RuntimeKind>().is_err());
    }
}
