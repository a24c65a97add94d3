use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("URL parsing error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl AppError {
    /// 获取错误类型的简洁摘要，用于日志中的错误分类
    pub fn get_error_type_summary(&self) -> &'static str {
        match self {
            AppError::IoError(_) => "candle_file_operation_failed",
            AppError::JsonError(_) => "candle_data_parsing_failed",
            AppError::TomlError(_) => "collector_config_unreadable",
            AppError::UrlParseError(_) => "tick_feed_endpoint_invalid",
            AppError::ConfigError(_) => "collector_configuration_invalid",
            AppError::WebSocketError(_) => "tick_feed_connection_failed",
            AppError::ChannelError(_) => "tick_pipeline_failed",
        }
    }

    /// 检查错误是否为可重试类型
    ///
    /// 持久化周期本身不重试，这里只用于决定下一周期是否值得再试
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::IoError(_) | AppError::WebSocketError(_) => true,

            AppError::JsonError(_)
            | AppError::TomlError(_)
            | AppError::UrlParseError(_)
            | AppError::ConfigError(_)
            | AppError::ChannelError(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
