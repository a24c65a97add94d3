//! 蜡烛聚合器 - 把Tick折叠进每个品种进行中的蜡烛

use crate::common::{bucket_start, log_targets::CANDLE_AGGREGATOR, Candle, Tick, TIMEFRAME_SECS};
use std::collections::{BTreeMap, VecDeque};
use tracing::trace;

/// 单个品种的聚合状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetState {
    /// 进行中的蜡烛，收到第一笔Tick之前为空
    pub current: Option<Candle>,
    /// 已完成但尚未落盘的蜡烛，按完成顺序排列
    ///
    /// 滑动窗口存储把它当作有界序列使用，从不清空。
    pub pending: VecDeque<Candle>,
}

impl AssetState {
    /// 最近一根蜡烛：优先进行中的，否则最后完成的
    pub fn latest(&self) -> Option<&Candle> {
        self.current.as_ref().or_else(|| self.pending.back())
    }
}

/// 一次 admit 的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Tick缺少品种，被丢弃，状态未变
    Dropped,
    /// 更新了进行中的蜡烛
    Updated,
    /// 开出了新蜡烛；若此前有进行中的蜡烛，它已完成
    Opened { completed: Option<Candle> },
}

impl Admission {
    pub fn completed(&self) -> Option<Candle> {
        match self {
            Admission::Opened { completed } => *completed,
            _ => None,
        }
    }
}

/// 蜡烛聚合器
#[derive(Debug, Clone, Copy)]
pub struct CandleAggregator {
    timeframe_secs: i64,
}

impl Default for CandleAggregator {
    fn default() -> Self {
        Self {
            timeframe_secs: TIMEFRAME_SECS,
        }
    }
}

impl CandleAggregator {
    /// 使用Tick更新品种状态
    ///
    /// 周期不同即视为新周期，包括比当前更早的周期：旧蜡烛原样完成，
    /// 迟到的Tick开出一根"过去"的蜡烛，不向前合并。
    pub fn admit(&self, state: &mut AssetState, tick: &Tick) -> Admission {
        let bucket = bucket_start(tick.time, self.timeframe_secs);

        if let Some(current) = state.current.as_mut() {
            if current.time == bucket {
                current.apply_price(tick.price);
                return Admission::Updated;
            }
        }

        let completed = state.current.replace(Candle::open_at(bucket, tick.price));
        if let Some(done) = &completed {
            trace!(target: CANDLE_AGGREGATOR, asset = %tick.asset, time = done.time, new_time = bucket, "蜡烛已完成");
        }
        Admission::Opened { completed }
    }
}

/// 运行时独占的品种状态表，附带聚合器
///
/// 三种存储都持有一个；完成的蜡烛在这里进入 pending 队列。
#[derive(Debug, Default)]
pub struct CandleBook {
    aggregator: CandleAggregator,
    assets: BTreeMap<String, AssetState>,
}

impl CandleBook {
    /// 聚合Tick，完成的蜡烛追加到该品种 pending 队列尾部
    ///
    /// 品种名不安全、价格非有限值或时间越界的Tick被丢弃，不论它来自哪个Tick源。
    pub fn admit(&mut self, tick: &Tick) -> Admission {
        if !tick.is_admissible() {
            trace!(target: CANDLE_AGGREGATOR, asset = %tick.asset, time = tick.time, "丢弃不合法的Tick");
            return Admission::Dropped;
        }

        let state = self.assets.entry(tick.asset.clone()).or_default();
        let admission = self.aggregator.admit(state, tick);
        if let Some(done) = admission.completed() {
            state.pending.push_back(done);
        }
        admission
    }

    pub fn get(&self, asset: &str) -> Option<&AssetState> {
        self.assets.get(asset)
    }

    pub fn get_mut(&mut self, asset: &str) -> Option<&mut AssetState> {
        self.assets.get_mut(asset)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AssetState)> {
        self.assets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut AssetState)> {
        self.assets.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
