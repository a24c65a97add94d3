//! 采集运行时
//!
//! 一个运行时 = 一个Tick源 + 一个存储 + 一个调度器，全部由同一个tokio任务独占。
//! Tick聚合与刷盘在 `select!` 中交替执行，互不重叠，因此不需要锁。

use crate::collector::candle_aggregator::Admission;
use crate::collector::persistence_scheduler::PersistenceScheduler;
use crate::collector::retention::{build_store, RetentionStore};
use crate::common::{log_targets::COLLECTOR_RUNTIME, CollectorConfig, RuntimeKind};
use crate::feed::TickSource;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, instrument};

/// 运行时退出时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub ticks_admitted: u64,
    pub ticks_dropped: u64,
    pub candles_completed: u64,
    pub cycles_run: u64,
    pub cycle_errors: u64,
}

pub struct CollectorRuntime<S: TickSource> {
    kind: RuntimeKind,
    source: S,
    store: Box<dyn RetentionStore>,
    scheduler: PersistenceScheduler,
    stats: RuntimeStats,
}

impl<S: TickSource> CollectorRuntime<S> {
    pub fn new(source: S, store: Box<dyn RetentionStore>, scheduler: PersistenceScheduler) -> Self {
        Self {
            kind: store.kind(),
            source,
            store,
            scheduler,
            stats: RuntimeStats::default(),
        }
    }

    /// 按配置组装运行时；调度器的计时器从这里开始计时，需在tokio运行时内调用
    pub fn from_config(kind: RuntimeKind, config: &CollectorConfig, source: S) -> Self {
        Self::new(
            source,
            build_store(kind, config),
            PersistenceScheduler::for_runtime(kind, config),
        )
    }

    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    pub fn store(&self) -> &dyn RetentionStore {
        self.store.as_ref()
    }

    /// 主循环，直到收到关闭信号或Tick源关闭；退出前执行最后一轮持久化
    #[instrument(name = "collector_runtime", skip_all, fields(runtime = %self.kind))]
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> RuntimeStats {
        info!(
            target: COLLECTOR_RUNTIME,
            event_name = "CollectorRuntimeStarted",
            tasks = ?self.scheduler.tasks().iter().map(|t| t.kind.name()).collect::<Vec<_>>()
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!(target: COLLECTOR_RUNTIME, event_name = "ShutdownSignalReceived");
                    break;
                }

                task = self.scheduler.next_due() => {
                    self.stats.cycles_run += 1;
                    if let Err(e) = PersistenceScheduler::execute(&task, self.store.as_mut(), Utc::now()) {
                        self.stats.cycle_errors += 1;
                        error!(
                            target: COLLECTOR_RUNTIME,
                            event_name = "PersistenceCycleFailed",
                            task = task.kind.name(),
                            error_type = e.get_error_type_summary(),
                            error = %e
                        );
                    }
                }

                tick = self.source.next_tick() => match tick {
                    Some(tick) => match self.store.admit(&tick) {
                        Admission::Dropped => self.stats.ticks_dropped += 1,
                        admission => {
                            self.stats.ticks_admitted += 1;
                            if admission.completed().is_some() {
                                self.stats.candles_completed += 1;
                            }
                        }
                    },
                    None => {
                        info!(target: COLLECTOR_RUNTIME, event_name = "TickSourceClosed");
                        break;
                    }
                },
            }
        }

        self.scheduler.run_final_cycle(self.store.as_mut(), Utc::now());

        info!(
            target: COLLECTOR_RUNTIME,
            event_name = "CollectorRuntimeStopped",
            assets = self.store.book().len(),
            ticks_admitted = self.stats.ticks_admitted,
            ticks_dropped = self.stats.ticks_dropped,
            candles_completed = self.stats.candles_completed,
            cycles_run = self.stats.cycles_run,
            cycle_errors = self.stats.cycle_errors
        );
        self.stats
    }
}
