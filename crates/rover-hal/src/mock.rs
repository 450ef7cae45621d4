//! 测试替身（`mock` feature）
//!
//! 所有替身都是 `Clone` 的共享句柄：把一个副本交给被测组件，
//! 测试线程持有另一个副本用于注入读数和检查调用记录。

use crate::{ActuatorSink, Camera, HalError, LedTarget, LineBits, MotorDuty, SensorSource};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// 执行器调用记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    Drive(MotorDuty),
    Buzzer(bool),
    Led(LedTarget, bool),
}

/// 录制所有调用的执行器
#[derive(Debug, Clone, Default)]
pub struct RecordingActuators {
    calls: Arc<Mutex<Vec<ActuatorCall>>>,
}

impl RecordingActuators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// 所有 `drive` 调用（按顺序）
    pub fn drives(&self) -> Vec<MotorDuty> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ActuatorCall::Drive(duty) => Some(*duty),
                _ => None,
            })
            .collect()
    }

    pub fn last_drive(&self) -> Option<MotorDuty> {
        self.drives().last().copied()
    }

    /// 蜂鸣器最后一次写入的状态
    pub fn buzzer(&self) -> Option<bool> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            ActuatorCall::Buzzer(on) => Some(*on),
            _ => None,
        })
    }
}

impl ActuatorSink for RecordingActuators {
    fn drive(&mut self, duty: MotorDuty) -> Result<(), HalError> {
        self.calls.lock().push(ActuatorCall::Drive(duty));
        Ok(())
    }

    fn set_buzzer(&mut self, on: bool) -> Result<(), HalError> {
        self.calls.lock().push(ActuatorCall::Buzzer(on));
        Ok(())
    }

    fn set_led(&mut self, target: LedTarget, on: bool) -> Result<(), HalError> {
        self.calls.lock().push(ActuatorCall::Led(target, on));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Readings {
    distance_cm: Option<f32>,
    line_bits: Option<LineBits>,
    battery_voltage: Option<f32>,
}

/// 脚本化传感器：返回测试设定的读数，直到再次修改
///
/// `line_bits` 为 `None` 时读取返回 `HalError::Sensor`。
#[derive(Debug, Clone)]
pub struct ScriptedSensors {
    readings: Arc<Mutex<Readings>>,
}

impl ScriptedSensors {
    /// 默认：前方 100 cm，只有中间传感器压线，电池 7.4 V
    pub fn new() -> Self {
        Self {
            readings: Arc::new(Mutex::new(Readings {
                distance_cm: Some(100.0),
                line_bits: LineBits::new(0b010).ok(),
                battery_voltage: Some(7.4),
            })),
        }
    }

    pub fn set_distance(&self, distance_cm: Option<f32>) {
        self.readings.lock().distance_cm = distance_cm;
    }

    pub fn set_line_bits(&self, bits: Option<LineBits>) {
        self.readings.lock().line_bits = bits;
    }

    pub fn set_battery(&self, volts: Option<f32>) {
        self.readings.lock().battery_voltage = volts;
    }
}

impl Default for ScriptedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for ScriptedSensors {
    fn read_distance_cm(&mut self) -> Result<Option<f32>, HalError> {
        Ok(self.readings.lock().distance_cm)
    }

    fn read_line_bits(&mut self) -> Result<LineBits, HalError> {
        self.readings
            .lock()
            .line_bits
            .ok_or_else(|| HalError::Sensor("scripted line sensor failure".to_string()))
    }

    fn read_battery_voltage(&mut self) -> Result<Option<f32>, HalError> {
        Ok(self.readings.lock().battery_voltage)
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// 计数相机
///
/// 记录拍摄路径，并统计同时进行中的拍摄数量的峰值。
#[derive(Debug, Clone, Default)]
pub struct CountingCamera {
    inner: Arc<CameraStats>,
    exposure: Duration,
}

#[derive(Debug, Default)]
struct CameraStats {
    paths: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fail: AtomicBool,
}

impl CountingCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次拍摄阻塞 `exposure`
    pub fn with_exposure(exposure: Duration) -> Self {
        Self {
            inner: Arc::default(),
            exposure,
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.inner.fail.store(fail, Ordering::SeqCst);
    }

    pub fn captures(&self) -> Vec<PathBuf> {
        self.inner.paths.lock().clone()
    }

    pub fn capture_count(&self) -> usize {
        self.inner.paths.lock().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }
}

impl Camera for CountingCamera {
    fn capture_image(&mut self, path: &Path) -> Result<(), HalError> {
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.exposure.is_zero() {
            thread::sleep(self.exposure);
        }
        let result = if self.inner.fail.load(Ordering::SeqCst) {
            Err(HalError::Camera("scripted camera failure".to_string()))
        } else {
            self.inner.paths.lock().push(path.to_path_buf());
            Ok(())
        };

        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_actuators_shared_log() {
        let recorder = RecordingActuators::new();
        let mut sink = recorder.clone();
        sink.drive(MotorDuty::uniform(300)).unwrap();
        sink.set_buzzer(true).unwrap();
        sink.drive(MotorDuty::STOP).unwrap();

        assert_eq!(recorder.drives(), vec![MotorDuty::uniform(300), MotorDuty::STOP]);
        assert_eq!(recorder.last_drive(), Some(MotorDuty::STOP));
        assert_eq!(recorder.buzzer(), Some(true));
        assert_eq!(recorder.calls().len(), 3);
    }

    #[test]
    fn test_scripted_sensors() {
        let script = ScriptedSensors::new();
        let mut sensors = script.clone();
        assert_eq!(sensors.read_distance_cm().unwrap(), Some(100.0));

        script.set_distance(Some(15.0));
        script.set_line_bits(None);
        assert_eq!(sensors.read_distance_cm().unwrap(), Some(15.0));
        assert!(matches!(sensors.read_line_bits(), Err(HalError::Sensor(_))));
    }

    #[test]
    fn test_counting_camera() {
        let camera = CountingCamera::new();
        let mut worker_side = camera.clone();
        worker_side.capture_image(Path::new("a.jpg")).unwrap();

        camera.set_failing(true);
        assert!(worker_side.capture_image(Path::new("b.jpg")).is_err());

        assert_eq!(camera.capture_count(), 1);
        assert_eq!(camera.peak_in_flight(), 1);
        assert_eq!(camera.in_flight(), 0);
    }
}
