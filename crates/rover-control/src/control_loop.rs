//! 控制循环
//!
//! 单线程顺序执行，每个 tick：
//!
//! 1. 清除停止锁存，按到达顺序把收件箱中的指令交给 [`CommandRouter`]
//! 2. 根据 [`ControlState`] 行动：未激活保持停车；巡线模式读传感器并执行
//!    [`fusion::decide`] 的决策；手动模式保持最近一次占空比
//! 3. 到期时采样遥测，写入本地缓冲并发布
//!
//! 控制循环独占 `ControlState` 与执行器。

use crate::capture::CaptureService;
use crate::fusion::{self, FusionConfig, FusionDecision};
use crate::inbox::{DEFAULT_INBOX_CAPACITY, InboxReceiver};
use crate::publish::TelemetryPublisher;
use crate::router::{CommandRouter, ManualDuties, log_write};
use rover_hal::{ActuatorSink, HalError, LedTarget, SensorSource};
use rover_protocol::{
    CaptureTrigger, CommandMessage, ControlState, LineBits, Mode, MotorDuty, TelemetryPayload,
    TelemetryRecord,
};
use rover_store::TelemetryBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 避障动作参数
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleConfig {
    /// 后退占空比（四轮相同）
    pub reverse_duty: i32,
    /// 后退持续时间
    pub reverse_duration: Duration,
    /// 动作结束后的停顿
    pub settle: Duration,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            reverse_duty: -500,
            reverse_duration: Duration::from_millis(800),
            settle: Duration::from_millis(50),
        }
    }
}

/// 控制循环配置
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// 激活状态下的 tick 周期
    pub tick: Duration,
    /// 未激活状态下的 tick 周期
    pub idle_tick: Duration,
    /// 遥测采样间隔
    pub telemetry_interval: Duration,
    /// 启动时的模式（未激活）
    pub initial_mode: Mode,
    pub fusion: FusionConfig,
    pub obstacle: ObstacleConfig,
    pub manual: ManualDuties,
    pub inbox_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            idle_tick: Duration::from_millis(100),
            telemetry_interval: Duration::from_secs(10),
            initial_mode: Mode::LineFollow,
            fusion: FusionConfig::default(),
            obstacle: ObstacleConfig::default(),
            manual: ManualDuties::default(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// 控制循环统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub obstacles: u64,
    pub aborted_manoeuvres: u64,
    pub telemetry_samples: u64,
}

/// 记录最近一次成功下发的占空比
struct TrackedActuators<A> {
    inner: A,
    last_duty: MotorDuty,
}

impl<A: ActuatorSink> ActuatorSink for TrackedActuators<A> {
    fn drive(&mut self, duty: MotorDuty) -> Result<(), HalError> {
        self.inner.drive(duty)?;
        self.last_duty = duty;
        Ok(())
    }

    fn set_buzzer(&mut self, on: bool) -> Result<(), HalError> {
        self.inner.set_buzzer(on)
    }

    fn set_led(&mut self, target: LedTarget, on: bool) -> Result<(), HalError> {
        self.inner.set_led(target, on)
    }
}

/// 控制循环
pub struct ControlLoop<S, A> {
    config: ControlConfig,
    state: ControlState,
    sensors: S,
    actuators: TrackedActuators<A>,
    router: CommandRouter,
    capture: CaptureService,
    inbox: InboxReceiver,
    buffer: Arc<TelemetryBuffer>,
    publisher: Option<Arc<dyn TelemetryPublisher>>,
    last_telemetry: Option<Instant>,
    stats: LoopStats,
}

impl<S: SensorSource, A: ActuatorSink> ControlLoop<S, A> {
    pub fn new(
        config: ControlConfig,
        sensors: S,
        actuators: A,
        capture: CaptureService,
        inbox: InboxReceiver,
        buffer: Arc<TelemetryBuffer>,
    ) -> Self {
        Self {
            state: ControlState::new(config.initial_mode),
            router: CommandRouter::new(config.manual),
            config,
            sensors,
            actuators: TrackedActuators {
                inner: actuators,
                last_duty: MotorDuty::STOP,
            },
            capture,
            inbox,
            buffer,
            publisher: None,
            last_telemetry: None,
            stats: LoopStats::default(),
        }
    }

    /// 设置遥测发布端（未设置时只写本地缓冲）
    pub fn with_publisher(mut self, publisher: Arc<dyn TelemetryPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// 最近一次成功下发的占空比
    pub fn last_duty(&self) -> MotorDuty {
        self.actuators.last_duty
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn capture(&self) -> &CaptureService {
        &self.capture
    }

    /// 运行直到 `shutdown` 被置位
    ///
    /// 当前 tick 完成后退出，退出时停车并关闭蜂鸣器。
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            "Control loop started (mode={}, tick={:?})",
            self.state.mode, self.config.tick
        );
        while !shutdown.load(Ordering::Acquire) {
            let delay = self.tick();
            if !delay.is_zero() {
                self.inbox.pause(delay);
            }
        }
        self.halt();
        info!("Control loop stopped after {} ticks", self.stats.ticks);
    }

    /// 执行一个 tick
    ///
    /// # 返回
    ///
    /// 距下一个 tick 的等待时间
    pub fn tick(&mut self) -> Duration {
        self.stats.ticks += 1;

        self.inbox.begin_tick();
        for command in self.inbox.drain() {
            self.router
                .handle(command, &mut self.state, &mut self.actuators, &self.capture);
        }
        if self.inbox.take_overflow_stop() {
            warn!("Stop command overflowed the inbox, applying it now");
            self.router.handle(
                CommandMessage::Stop,
                &mut self.state,
                &mut self.actuators,
                &self.capture,
            );
        }

        let delay = if !self.state.active {
            self.hold_stopped();
            self.config.idle_tick
        } else {
            match self.state.mode {
                Mode::LineFollow => self.line_follow_step(),
                // 保持最近一次手动占空比
                Mode::Manual => self.config.tick,
                Mode::Idle => {
                    self.hold_stopped();
                    self.config.idle_tick
                },
            }
        };

        self.emit_telemetry_if_due();
        delay
    }

    fn hold_stopped(&mut self) {
        log_write(self.actuators.drive(MotorDuty::STOP), "drive");
        if self.state.buzzer_on {
            log_write(self.actuators.set_buzzer(false), "buzzer");
            self.state.buzzer_on = false;
        }
    }

    fn line_follow_step(&mut self) -> Duration {
        let distance = self.read_distance();
        let bits = self.read_line_bits();

        match fusion::decide(distance, bits, &self.config.fusion) {
            FusionDecision::Drive(duty) => {
                log_write(self.actuators.drive(duty), "drive");
                self.config.tick
            },
            FusionDecision::AvoidObstacle => {
                info!("Obstacle at {:.1} cm, avoiding", distance.unwrap_or_default());
                self.avoid_obstacle();
                Duration::ZERO
            },
        }
    }

    /// 停车 → 鸣笛 → 拍照 → 后退 → 停车 → 关蜂鸣器 → 停顿
    ///
    /// 每一步之间检查停止锁存，收到 Stop 时立即停车并放弃剩余步骤。
    fn avoid_obstacle(&mut self) {
        self.stats.obstacles += 1;

        log_write(self.actuators.drive(MotorDuty::STOP), "drive");
        log_write(self.actuators.set_buzzer(true), "buzzer");
        self.state.buzzer_on = true;
        if !self.capture.request(CaptureTrigger::ObstacleDetected) {
            debug!("Obstacle capture skipped, capture in flight");
        }
        if self.inbox.stop_requested() {
            return self.abort_manoeuvre();
        }

        let obstacle = &self.config.obstacle;
        let (reverse, reverse_duration, settle) = (
            MotorDuty::uniform(obstacle.reverse_duty),
            obstacle.reverse_duration,
            obstacle.settle,
        );
        log_write(self.actuators.drive(reverse), "drive");
        if self.inbox.pause(reverse_duration) {
            return self.abort_manoeuvre();
        }

        log_write(self.actuators.drive(MotorDuty::STOP), "drive");
        log_write(self.actuators.set_buzzer(false), "buzzer");
        self.state.buzzer_on = false;
        if self.inbox.pause(settle) {
            debug!("Stop received during obstacle settle");
        }
    }

    fn abort_manoeuvre(&mut self) {
        self.stats.aborted_manoeuvres += 1;
        log_write(self.actuators.drive(MotorDuty::STOP), "drive");
        log_write(self.actuators.set_buzzer(false), "buzzer");
        self.state.buzzer_on = false;
        info!("Obstacle manoeuvre aborted by stop");
    }

    fn emit_telemetry_if_due(&mut self) {
        let interval = self.config.telemetry_interval;
        if !self.last_telemetry.is_none_or(|last| last.elapsed() >= interval) {
            return;
        }
        self.last_telemetry = Some(Instant::now());
        self.stats.telemetry_samples += 1;

        let record = TelemetryRecord::now(
            self.state.mode,
            self.read_line_bits(),
            self.read_distance(),
            self.read_battery(),
            self.actuators.last_duty,
        );

        match self.buffer.insert(&record) {
            Ok(id) => debug!("Telemetry buffered as {}", id),
            Err(e) => error!("Failed to buffer telemetry: {}", e),
        }

        if let Some(publisher) = &self.publisher {
            let payload =
                TelemetryPayload::from_record(&record, &self.state, self.sensors.is_simulated());
            if let Err(e) = publisher.send_telemetry(&payload) {
                warn!("Telemetry not published: {}", e);
            }
        }
    }

    fn read_distance(&mut self) -> Option<f32> {
        self.sensors.read_distance_cm().unwrap_or_else(|e| {
            warn!("Distance read failed: {}", e);
            None
        })
    }

    fn read_line_bits(&mut self) -> Option<LineBits> {
        match self.sensors.read_line_bits() {
            Ok(bits) => Some(bits),
            Err(e) => {
                warn!("Line sensor read failed: {}", e);
                None
            },
        }
    }

    fn read_battery(&mut self) -> Option<f32> {
        self.sensors.read_battery_voltage().unwrap_or_else(|e| {
            warn!("Battery read failed: {}", e);
            None
        })
    }

    /// 停车并关闭蜂鸣器（退出时调用）
    fn halt(&mut self) {
        log_write(self.actuators.drive(MotorDuty::STOP), "drive");
        log_write(self.actuators.set_buzzer(false), "buzzer");
        self.state.active = false;
        self.state.buzzer_on = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_config_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.tick, Duration::from_millis(50));
        assert_eq!(config.idle_tick, Duration::from_millis(100));
        assert_eq!(config.telemetry_interval, Duration::from_secs(10));
        assert_eq!(config.initial_mode, Mode::LineFollow);
        assert_eq!(config.obstacle.reverse_duty, -500);
        assert_eq!(config.obstacle.reverse_duration, Duration::from_millis(800));
        assert_eq!(config.inbox_capacity, 64);
    }
}
