//! 控制层错误类型定义

use rover_hal::HalError;
use rover_link::TransportError;
use rover_protocol::ProtocolError;
use rover_store::StoreError;
use thiserror::Error;

/// 控制层错误
///
/// 控制循环内部不向外传播这些错误：传感器错误以缺失值替代，
/// 执行器、存储与发布错误只记录日志。
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
