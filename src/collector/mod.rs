// 采集核心：聚合、保留策略、文件写入、调度与运行时
pub mod candle_aggregator;
pub mod candle_file;
pub mod persistence_scheduler;
pub mod retention;
pub mod runtime;

pub use candle_aggregator::{Admission, AssetState, CandleAggregator, CandleBook};
pub use candle_file::{AtomicFileWriter, CandleFile, LoadOutcome};
pub use persistence_scheduler::{PersistenceScheduler, ScheduledTask, TaskKind};
pub use retention::{
    build_store, FlushFailure, FlushReport, PruningArchiveStore, RetentionStore, RotatingDailyStore,
    SlidingWindowStore,
};
pub use runtime::{CollectorRuntime, RuntimeStats};
