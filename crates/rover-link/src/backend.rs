//! 传输后端抽象
//!
//! 监督线程只依赖这两个 trait：
//!
//! - [`LinkSession`]: 事件轮询端，由监督线程独占
//! - [`LinkHandle`]: 请求端（发布 / 订阅 / 断开），可被任意线程共享
//!
//! 会话在连接错误后继续轮询即会自动重连。

use crate::error::TransportError;
use std::sync::Arc;

/// 轮询得到的链路事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// 连接建立（收到 ConnAck）
    Connected,
    /// 入站消息
    Message { topic: String, payload: Vec<u8> },
    /// 其他协议事件（PingResp、PubAck 等）或本次轮询超时
    Idle,
}

/// 事件轮询端
pub trait LinkSession: Send {
    /// 等待下一个事件
    ///
    /// # 返回
    ///
    /// - `Some(Ok(event))`: 一个事件
    /// - `Some(Err(e))`: 连接错误，下一次轮询会尝试重连
    /// - `None`: 会话已关闭，监督线程应退出
    fn next_event(&mut self) -> Option<Result<LinkEvent, TransportError>>;
}

/// 请求端
///
/// 所有方法都只把请求放入队列，不等待网络往返。
pub trait LinkHandle: Send + Sync {
    /// 以至少一次（QoS 1）语义发布
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;
}

/// 建立一对会话与请求端
pub trait LinkConnector: Send + Sync {
    fn open(&self) -> Result<(Arc<dyn LinkHandle>, Box<dyn LinkSession>), TransportError>;
}
