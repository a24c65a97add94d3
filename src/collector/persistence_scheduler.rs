//! 持久化调度器
//!
//! 持有一组 (任务, 周期)，`next_due` 等待最早到期的任务，`execute` 对存储执行它。
//! 调度器不持有存储，由运行时在同一任务里把存储借给它，因此刷盘永远不会与Tick聚合重叠。

use crate::collector::candle_file::AtomicFileWriter;
use crate::collector::retention::{FlushReport, RetentionStore};
use crate::common::{log_targets::PERSISTENCE_SCHEDULER, CollectorConfig, Result, RuntimeKind};
use chrono::{DateTime, Utc};
use std::future::poll_fn;
use std::path::PathBuf;
use std::task::Poll;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 任务种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// 只刷盘
    Flush,
    /// 刷盘后在同一次执行里清理，避免删掉刚写入的当天文件
    FlushAndCleanup,
    /// 原子写入实时快照
    Snapshot { path: PathBuf },
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Flush => "flush",
            TaskKind::FlushAndCleanup => "flush_and_cleanup",
            TaskKind::Snapshot { .. } => "snapshot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub kind: TaskKind,
    pub period: Duration,
}

impl ScheduledTask {
    pub fn new(kind: TaskKind, period: Duration) -> Self {
        Self { kind, period }
    }
}

pub struct PersistenceScheduler {
    tasks: Vec<ScheduledTask>,
    timers: Vec<Interval>,
}

impl PersistenceScheduler {
    /// 每个任务一个独立计时器，首次触发在一个周期之后；落后时跳过错过的触发
    pub fn new(tasks: Vec<ScheduledTask>) -> Self {
        let start = Instant::now();
        let timers = tasks
            .iter()
            .map(|task| {
                let mut timer = interval_at(start + task.period, task.period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                timer
            })
            .collect();
        Self { tasks, timers }
    }

    /// 运行时对应的任务表
    pub fn for_runtime(kind: RuntimeKind, config: &CollectorConfig) -> Self {
        let tasks = match kind {
            RuntimeKind::Recent => vec![
                ScheduledTask::new(TaskKind::Flush, Duration::from_secs(config.recent.save_interval_secs)),
                ScheduledTask::new(
                    TaskKind::Snapshot {
                        path: config.recent.snapshot_path.clone(),
                    },
                    Duration::from_secs(config.recent.snapshot_interval_secs),
                ),
            ],
            RuntimeKind::Daily => vec![ScheduledTask::new(
                TaskKind::FlushAndCleanup,
                Duration::from_secs(config.daily.flush_interval_secs),
            )],
            RuntimeKind::Monthly => vec![ScheduledTask::new(
                TaskKind::Flush,
                Duration::from_secs(config.monthly.flush_interval_secs),
            )],
        };
        Self::new(tasks)
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    /// 等待下一个到期任务；同时到期时按任务表顺序依次返回
    pub async fn next_due(&mut self) -> ScheduledTask {
        let timers = &mut self.timers;
        let index = poll_fn(|cx| {
            for (index, timer) in timers.iter_mut().enumerate() {
                if timer.poll_tick(cx).is_ready() {
                    return Poll::Ready(index);
                }
            }
            Poll::Pending
        })
        .await;
        self.tasks[index].clone()
    }

    /// 对存储执行一个任务
    ///
    /// 单个品种的写入失败已记录在报告里，不会让这里返回错误。
    pub fn execute(task: &ScheduledTask, store: &mut dyn RetentionStore, now: DateTime<Utc>) -> Result<()> {
        match &task.kind {
            TaskKind::Flush => {
                let report = store.flush(now);
                log_flush_report(store.kind(), &report);
            }
            TaskKind::FlushAndCleanup => {
                let report = store.flush(now);
                log_flush_report(store.kind(), &report);
                let removed = store.cleanup(now)?;
                if removed > 0 {
                    info!(target: PERSISTENCE_SCHEDULER, event_name = "StaleFilesRemoved", runtime = %store.kind(), removed);
                }
            }
            TaskKind::Snapshot { path } => {
                let snapshot = store.snapshot_view();
                if snapshot.is_empty() {
                    return Ok(());
                }
                AtomicFileWriter::write_json(path, &snapshot)?;
                debug!(target: PERSISTENCE_SCHEDULER, runtime = %store.kind(), assets = snapshot.len(), path = %path.display(), "快照已写入");
            }
        }
        Ok(())
    }

    /// 关闭前把所有任务各执行一次，任一失败不影响其余任务
    pub fn run_final_cycle(&self, store: &mut dyn RetentionStore, now: DateTime<Utc>) {
        info!(target: PERSISTENCE_SCHEDULER, event_name = "FinalPersistenceRun", runtime = %store.kind(), tasks = self.tasks.len());
        for task in &self.tasks {
            if let Err(e) = Self::execute(task, store, now) {
                error!(
                    target: PERSISTENCE_SCHEDULER,
                    event_name = "FinalPersistenceTaskFailed",
                    runtime = %store.kind(),
                    task = task.kind.name(),
                    error_type = e.get_error_type_summary(),
                    error = %e
                );
            }
        }
    }
}

fn log_flush_report(runtime: RuntimeKind, report: &FlushReport) {
    if !report.is_clean() {
        warn!(
            target: PERSISTENCE_SCHEDULER,
            event_name = "PersistenceCyclePartial",
            %runtime,
            assets_written = report.assets_written,
            candles_written = report.candles_written,
            failed_assets = report.failures.len()
        );
    } else if report.assets_written > 0 {
        info!(
            target: PERSISTENCE_SCHEDULER,
            event_name = "PersistenceCycleCompleted",
            %runtime,
            assets_written = report.assets_written,
            candles_written = report.candles_written
        );
    } else {
        debug!(target: PERSISTENCE_SCHEDULER, %runtime, "本周期没有需要写入的数据");
    }
}
