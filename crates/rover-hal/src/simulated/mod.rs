//! 模拟后端
//!
//! 在没有硬件的机器上运行整车逻辑：传感器返回随机值，执行器只记录日志，
//! 相机写入占位图片。

mod camera;

pub use camera::SimulatedCamera;

use crate::{ActuatorSink, HalError, LedTarget, LineBits, MotorDuty, SensorSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// 随机传感器
///
/// - 距离：10 ~ 100 cm
/// - 巡线：0 ~ 7 随机
/// - 电池：7.0 ~ 8.4 V
pub struct SimulatedSensors {
    rng: StdRng,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// 固定种子（可复现的读数序列）
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SimulatedSensors {
    fn read_distance_cm(&mut self) -> Result<Option<f32>, HalError> {
        let cm: f32 = self.rng.gen_range(10.0..100.0);
        Ok(Some((cm * 10.0).round() / 10.0))
    }

    fn read_line_bits(&mut self) -> Result<LineBits, HalError> {
        LineBits::new(self.rng.gen_range(0..=7)).map_err(|e| HalError::Sensor(e.to_string()))
    }

    fn read_battery_voltage(&mut self) -> Result<Option<f32>, HalError> {
        let volts: f32 = self.rng.gen_range(7.0..8.4);
        Ok(Some((volts * 100.0).round() / 100.0))
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// 只记录日志的执行器
#[derive(Debug, Default)]
pub struct SimulatedActuators {
    last_duty: MotorDuty,
    buzzer_on: bool,
}

impl SimulatedActuators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_duty(&self) -> MotorDuty {
        self.last_duty
    }

    pub fn buzzer_on(&self) -> bool {
        self.buzzer_on
    }
}

impl ActuatorSink for SimulatedActuators {
    fn drive(&mut self, duty: MotorDuty) -> Result<(), HalError> {
        if duty != self.last_duty {
            debug!("[SIM] motors {:?}", duty.as_array());
        }
        self.last_duty = duty;
        Ok(())
    }

    fn set_buzzer(&mut self, on: bool) -> Result<(), HalError> {
        if on != self.buzzer_on {
            info!("[SIM] buzzer {}", if on { "on" } else { "off" });
        }
        self.buzzer_on = on;
        Ok(())
    }

    fn set_led(&mut self, target: LedTarget, on: bool) -> Result<(), HalError> {
        info!("[SIM] LED {:?} {}", target, if on { "on" } else { "off" });
        Ok(())
    }
}
