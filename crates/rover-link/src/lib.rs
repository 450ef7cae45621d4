//! # Rover Link
//!
//! 车端与远端之间的发布 / 订阅链路（MQTT over TLS）。
//!
//! - [`TransportClient`]: 连接、自动重连、发布、入站指令分发
//! - [`CommandCallback`]: 入站指令回调（必须非阻塞）
//! - [`LinkState`]: Disconnected → Connecting → Connected 状态机
//! - [`backend`]: 传输后端抽象，默认实现为 rumqttc

pub mod backend;
mod callback;
mod client;
mod error;
mod mqtt;
mod state;

pub use backend::{LinkConnector, LinkEvent, LinkHandle, LinkSession};
pub use callback::CommandCallback;
pub use client::{LinkConfig, LinkStatsSnapshot, TransportClient};
pub use error::TransportError;
pub use mqtt::{MqttConnector, default_client_id};
pub use state::{AtomicLinkState, LinkState};
