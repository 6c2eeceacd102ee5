//! 实时广播契约 - 基础设施层
//!
//! 评分落库之后要把更新后的提交推送给在线客户端。
//! 推送本身是 fire-and-forget：没有订阅者、投递失败都不影响评分结果

use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tracing::debug;

/// 广播通道的发布契约
///
/// 实现方通常是 WebSocket 网关；这里不要求任何投递保证
pub trait BroadcastChannel: Send + Sync + 'static {
    /// 发布一个事件（fire-and-forget）
    fn publish(&self, event: &str, payload: JsonValue);
}

/// 广播事件
#[derive(Debug, Clone)]
pub struct ScoredEvent {
    pub event: String,
    pub payload: JsonValue,
}

/// 进程内事件总线
///
/// 基于 tokio broadcast 通道的扇出实现，测试和批量评分模式使用
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<ScoredEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        // 缓冲 64 条足够覆盖一次批量评分的峰值
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<ScoredEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel for EventBus {
    fn publish(&self, event: &str, payload: JsonValue) {
        // 没有订阅者时 send 会返回 Err，按契约直接忽略
        let receivers = self
            .sender
            .send(ScoredEvent {
                event: event.to_string(),
                payload,
            })
            .unwrap_or(0);
        debug!("广播事件 {} 送达 {} 个订阅者", event, receivers);
    }
}
