// 行情输入：Tick源抽象、消息解析与WebSocket订阅
pub mod tick_message;
pub mod websocket;

pub use tick_message::parse_tick_message;
pub use websocket::TickFeed;

use crate::common::Tick;
use tokio::sync::mpsc;

/// Tick源
///
/// 同一品种按到达顺序交付，不保证按时间戳排序。返回 `None` 表示源已永久关闭。
pub trait TickSource: Send {
    fn next_tick(&mut self) -> impl std::future::Future<Output = Option<Tick>> + Send;
}

/// 基于 mpsc 通道的Tick源，运行时与测试都通过它接收Tick
pub struct ChannelTickSource {
    receiver: mpsc::Receiver<Tick>,
}

impl ChannelTickSource {
    pub fn new(receiver: mpsc::Receiver<Tick>) -> Self {
        Self { receiver }
    }

    /// 创建有界通道，返回发送端与Tick源
    pub fn bounded(capacity: usize) -> (mpsc::Sender<Tick>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self::new(receiver))
    }
}

impl TickSource for ChannelTickSource {
    fn next_tick(&mut self) -> impl std::future::Future<Output = Option<Tick>> + Send {
        self.receiver.recv()
    }
}
