//! 链路状态机
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ConnAck──▶ Connected
//!      ▲                          ▲                       │
//!      │                          └──── backoff 到期 ◀────┤ 连接错误
//!      └──────────────── disconnect() ◀───────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 链路状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LinkState {
    /// 未连接（初始状态，或连接错误后的退避期）
    #[default]
    Disconnected = 0,
    /// 正在建立连接
    Connecting = 1,
    /// 已连接并订阅指令 topic
    Connected = 2,
}

impl LinkState {
    /// 从 u8 转换，无效值视为 Disconnected
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// 链路状态（原子版本，监督线程写、其他线程读）
#[derive(Debug, Default)]
pub struct AtomicLinkState {
    inner: AtomicU8,
}

impl AtomicLinkState {
    pub fn new(state: LinkState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> LinkState {
        LinkState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 设置新状态，返回旧状态
    pub fn swap(&self, state: LinkState) -> LinkState {
        LinkState::from_u8(self.inner.swap(state.as_u8(), Ordering::AcqRel))
    }

}
