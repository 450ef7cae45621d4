//! 传输层错误类型定义

use thiserror::Error;

/// 传输层错误
///
/// 连接类错误由监督线程自动重连处理，不会作为致命错误传给调用方。
#[derive(Error, Debug)]
pub enum TransportError {
    /// 客户端请求队列错误（队列已满或事件循环已退出）
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// 连接断开或握手失败
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected")]
    NotConnected,

    /// 会话已关闭（事件循环退出）
    #[error("Session closed")]
    Closed,

    /// 出站负载编码失败
    #[error("Encode error: {0}")]
    Encode(#[from] rover_protocol::ProtocolError),

    #[error("Failed to spawn supervisor thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Connection("tls handshake failed".to_string());
        assert_eq!(format!("{}", err), "Connection error: tls handshake failed");
        assert_eq!(format!("{}", TransportError::NotConnected), "Not connected");
    }
}
