//! 硬件抽象层错误类型

use thiserror::Error;

/// 传感器 / 执行器 / 相机错误
///
/// 传感器读取错误属于瞬时错误：调用方用“缺失值”替代并继续当前 tick。
#[derive(Error, Debug)]
pub enum HalError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 传感器读取失败（超时、回波丢失、ADC 异常等）
    #[error("Sensor read failed: {0}")]
    Sensor(String),

    /// 执行器写入失败
    #[error("Actuator write failed: {0}")]
    Actuator(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Device not available: {0}")]
    NotAvailable(String),
}
