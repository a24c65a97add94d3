//! WebSocket行情订阅
//!
//! 单连接订阅全部品种，解析后的Tick复制给每个运行时的通道。
//! 断线或出错后等待固定时间无条件重连，直到收到关闭信号。

use super::tick_message::{parse_tick_message, SUBSCRIBE_ALL_MESSAGE};
use crate::common::{config::SourceConfig, log_targets::TICK_FEED, AppError, Result, Tick};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

pub struct TickFeed {
    ws_url: String,
    reconnect_delay: Duration,
    subscribers: Vec<mpsc::Sender<Tick>>,
}

impl TickFeed {
    pub fn new(ws_url: impl Into<String>, reconnect_delay: Duration, subscribers: Vec<mpsc::Sender<Tick>>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect_delay,
            subscribers,
        }
    }

    pub fn from_config(source: &SourceConfig, subscribers: Vec<mpsc::Sender<Tick>>) -> Self {
        Self::new(
            source.ws_url.clone(),
            Duration::from_secs(source.reconnect_delay_secs),
            subscribers,
        )
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// 主循环：连接 → 订阅 → 转发，断开后等待重连
    ///
    /// 返回时丢弃所有发送端，运行时据此得知输入已结束。
    #[instrument(name = "tick_feed", skip_all, fields(ws_url = %self.ws_url))]
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(target: TICK_FEED, event_name = "TickFeedStarted", subscribers = self.subscribers.len());

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                result = self.run_session() => match result {
                    Ok(forwarded) => {
                        info!(target: TICK_FEED, event_name = "TickFeedDisconnected", forwarded, "行情连接已关闭，准备重连");
                    }
                    Err(e) => {
                        error!(
                            target: TICK_FEED,
                            event_name = "TickFeedSessionFailed",
                            error_type = e.get_error_type_summary(),
                            error = %e,
                            "行情连接失败，准备重连"
                        );
                    }
                },
                _ = shutdown_rx.changed() => break,
            }

            if self.subscribers.is_empty() {
                warn!(target: TICK_FEED, event_name = "TickFeedNoSubscribers", "所有运行时都已退出，停止订阅");
                break;
            }

            tokio::select! {
                _ = sleep(self.reconnect_delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        info!(target: TICK_FEED, event_name = "TickFeedStopped");
    }

    /// 一次完整连接，返回本次转发的Tick数
    async fn run_session(&mut self) -> Result<u64> {
        let (ws_stream, _) = connect_async(self.ws_url.as_str())
            .await
            .map_err(|e| AppError::WebSocketError(format!("连接 {} 失败: {}", self.ws_url, e)))?;
        info!(target: TICK_FEED, event_name = "TickFeedConnected");

        let (mut write, mut read) = ws_stream.split();
        write
            .send(Message::Text(SUBSCRIBE_ALL_MESSAGE.to_string()))
            .await
            .map_err(|e| AppError::WebSocketError(format!("发送订阅消息失败: {}", e)))?;

        let mut forwarded = 0u64;
        while let Some(message) = read.next().await {
            let message = message.map_err(|e| AppError::WebSocketError(e.to_string()))?;
            let tick = match message {
                Message::Text(text) => parse_tick_message(text.as_bytes()),
                Message::Binary(bytes) => parse_tick_message(&bytes),
                Message::Close(frame) => {
                    debug!(target: TICK_FEED, ?frame, "服务器关闭连接");
                    break;
                }
                // Ping由库自动回复
                _ => None,
            };

            let Some(tick) = tick else { continue };
            self.fan_out(tick).await;
            forwarded += 1;

            if self.subscribers.is_empty() {
                return Err(AppError::ChannelError("所有Tick通道都已关闭".to_string()));
            }
        }

        Ok(forwarded)
    }

    /// 复制给每个订阅者；接收端已关闭的订阅者被移除
    pub async fn fan_out(&mut self, tick: Tick) {
        let mut closed = Vec::new();
        for (index, subscriber) in self.subscribers.iter().enumerate() {
            if subscriber.send(tick.clone()).await.is_err() {
                closed.push(index);
            }
        }

        for index in closed.into_iter().rev() {
            self.subscribers.remove(index);
            warn!(target: TICK_FEED, event_name = "TickSubscriberClosed", remaining = self.subscribers.len());
        }
    }
}
