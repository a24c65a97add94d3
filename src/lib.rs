// 导出模块
pub mod collector;
pub mod common;
pub mod feed;

// Re-export error types
pub use common::{AppError, Result};
