//! # Rover HAL
//!
//! 硬件能力抽象：控制核心只依赖这里的 trait，具体驱动（超声波、红外巡线、
//! 电池 ADC、PCA9685 电机板、蜂鸣器、LED 灯带、相机）在构造时选定。
//!
//! - [`SensorSource`]: 传感器读取（控制循环线程）
//! - [`ActuatorSink`]: 电机 / 蜂鸣器 / LED 写入（只允许控制循环线程调用）
//! - [`Camera`]: 拍照（拍照工作线程）
//!
//! 内置 [`simulated`] 后端；启用 `mock` feature 后提供录制型测试替身。

mod error;
pub mod simulated;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::HalError;
pub use rover_protocol::{LedTarget, LineBits, MotorDuty};
pub use simulated::{SimulatedActuators, SimulatedCamera, SimulatedSensors};

use std::path::Path;

/// 传感器读取接口
///
/// 所有方法都可能失败；失败是瞬时的，调用方不应因此中止控制循环。
pub trait SensorSource: Send {
    /// 前方距离（厘米），无回波时返回 `Ok(None)`
    fn read_distance_cm(&mut self) -> Result<Option<f32>, HalError>;

    /// 三路巡线传感器（bit2 = 左, bit1 = 中, bit0 = 右）
    fn read_line_bits(&mut self) -> Result<LineBits, HalError>;

    /// 电池电压（伏），不可用时返回 `Ok(None)`
    fn read_battery_voltage(&mut self) -> Result<Option<f32>, HalError>;

    /// 是否为模拟后端（只用于遥测中的 `simulate` 字段）
    fn is_simulated(&self) -> bool {
        false
    }
}

/// 执行器接口
///
/// # 线程约束
///
/// 只有控制循环线程持有并调用该接口。
pub trait ActuatorSink: Send {
    /// 下发四轮占空比（`MotorDuty` 已限幅到 [-4095, 4095]）
    fn drive(&mut self, duty: MotorDuty) -> Result<(), HalError>;

    fn set_buzzer(&mut self, on: bool) -> Result<(), HalError>;

    fn set_led(&mut self, target: LedTarget, on: bool) -> Result<(), HalError>;
}

/// 相机接口
pub trait Camera: Send {
    /// 拍摄一张图片并写入 `path`
    fn capture_image(&mut self, path: &Path) -> Result<(), HalError>;
}

impl<T: SensorSource + ?Sized> SensorSource for Box<T> {
    fn read_distance_cm(&mut self) -> Result<Option<f32>, HalError> {
        (**self).read_distance_cm()
    }

    fn read_line_bits(&mut self) -> Result<LineBits, HalError> {
        (**self).read_line_bits()
    }

    fn read_battery_voltage(&mut self) -> Result<Option<f32>, HalError> {
        (**self).read_battery_voltage()
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}

impl<T: ActuatorSink + ?Sized> ActuatorSink for Box<T> {
    fn drive(&mut self, duty: MotorDuty) -> Result<(), HalError> {
        (**self).drive(duty)
    }

    fn set_buzzer(&mut self, on: bool) -> Result<(), HalError> {
        (**self).set_buzzer(on)
    }

    fn set_led(&mut self, target: LedTarget, on: bool) -> Result<(), HalError> {
        (**self).set_led(target, on)
    }
}

impl<T: Camera + ?Sized> Camera for Box<T> {
    fn capture_image(&mut self, path: &Path) -> Result<(), HalError> {
        (**self).capture_image(path)
    }
}
