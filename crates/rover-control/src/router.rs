//! 模式与指令路由
//!
//! 在控制循环线程上把 [`CommandMessage`] 应用到 [`ControlState`] 和执行器。
//! 除控制循环自身外，这是唯一修改控制状态的地方。

use crate::capture::CaptureService;
use rover_hal::{ActuatorSink, HalError};
use rover_protocol::{CaptureTrigger, CommandMessage, ControlState, Direction, Mode, MotorDuty};
use tracing::{debug, info, warn};

/// 手动驾驶的固定占空比（FL, BL, FR, BR）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualDuties {
    pub forward: MotorDuty,
    pub backward: MotorDuty,
    pub left: MotorDuty,
    pub right: MotorDuty,
}

impl Default for ManualDuties {
    fn default() -> Self {
        Self {
            forward: MotorDuty::uniform(800),
            backward: MotorDuty::uniform(-800),
            left: MotorDuty::new(-600, -600, 1000, 1000),
            right: MotorDuty::new(1000, 1000, -600, -600),
        }
    }
}

impl ManualDuties {
    pub fn duty(&self, direction: Direction) -> MotorDuty {
        match direction {
            Direction::Forward => self.forward,
            Direction::Backward => self.backward,
            Direction::Left => self.left,
            Direction::Right => self.right,
            Direction::Stop => MotorDuty::STOP,
        }
    }
}

/// 指令路由器
#[derive(Debug, Clone, Default)]
pub struct CommandRouter {
    manual: ManualDuties,
}

impl CommandRouter {
    pub fn new(manual: ManualDuties) -> Self {
        Self { manual }
    }

    /// 应用一条指令
    ///
    /// 从不失败：执行器写入错误只记录日志，无法识别的指令不改变状态。
    pub fn handle(
        &self,
        command: CommandMessage,
        state: &mut ControlState,
        actuators: &mut dyn ActuatorSink,
        capture: &CaptureService,
    ) {
        match command {
            CommandMessage::Stop => {
                state.active = false;
                state.buzzer_on = false;
                log_write(actuators.drive(MotorDuty::STOP), "drive");
                log_write(actuators.set_buzzer(false), "buzzer");
                capture.cancel_pending();
                info!("Stop: rover deactivated");
            },
            CommandMessage::Start => {
                state.active = true;
                info!("Start: rover active in {} mode", state.mode);
            },
            CommandMessage::ModeChange(mode) => {
                if !mode.is_selectable() {
                    warn!("Mode {} cannot be selected remotely, ignored", mode);
                    return;
                }
                state.mode = mode;
                state.active = true;
                info!("Mode changed to {}", mode);
            },
            CommandMessage::Manual(direction) => {
                state.mode = Mode::Manual;
                state.active = true;
                let duty = self.manual.duty(direction);
                log_write(actuators.drive(duty), "drive");
                debug!("Manual {:?}: {:?}", direction, duty.as_array());
            },
            CommandMessage::Buzzer(on) => {
                match actuators.set_buzzer(on) {
                    Ok(()) => state.buzzer_on = on,
                    Err(e) => warn!("Actuator buzzer write failed: {}", e),
                }
            },
            CommandMessage::LedControl { target, on } => {
                log_write(actuators.set_led(target, on), "led");
            },
            CommandMessage::Capture => {
                if !capture.request(CaptureTrigger::ManualRequest) {
                    debug!("Manual capture rejected");
                }
            },
            CommandMessage::Unknown(raw) => {
                debug!("Ignoring unknown command '{}'", raw);
            },
        }
    }
}

pub(crate) fn log_write(result: Result<(), HalError>, what: &str) {
    if let Err(e) = result {
        warn!("Actuator {} write failed: {}", what, e);
    }
}
