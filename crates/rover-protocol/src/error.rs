//! 协议层错误类型定义

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// 巡线传感器位超出 3 bit 范围
    #[error("Invalid line sensor bits: {0} (expected 0-7)")]
    InvalidLineBits(u8),

    /// 未知的运行模式名称
    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// 电机占空比序列化格式错误（需要 4 个整数）
    #[error("Invalid motor tuple: {0}")]
    InvalidMotor(String),

    /// JSON 编解码错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
