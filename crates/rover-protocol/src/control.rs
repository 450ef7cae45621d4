//! 控制状态与执行器数值类型
//!
//! `ControlState` 是整车唯一的控制状态值，只由控制循环线程持有和修改；
//! 其他组件只能通过指令（`CommandMessage`）请求状态变化。

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 电机占空比上限（PCA9685 12 bit）
pub const MAX_DUTY: i16 = 4095;

/// 运行模式
///
/// 线上名称沿用车端历史命名：巡线 + 超声波避障模式为 `infrared_ultrasonic`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// 巡线（红外）+ 超声波避障，自主驾驶
    #[default]
    LineFollow,
    /// 远程手动控制
    Manual,
    /// 空闲：激活时也保持电机停止
    Idle,
}

impl Mode {
    /// 线上（遥测、存储）使用的名称
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::LineFollow => "infrared_ultrasonic",
            Mode::Manual => "manual",
            Mode::Idle => "idle",
        }
    }

    /// 是否可以作为 `ModeChange` 的目标
    ///
    /// 只有驾驶模式可以被远程切换；`Idle` 只能通过配置作为初始模式。
    pub fn is_selectable(self) -> bool {
        matches!(self, Mode::LineFollow | Mode::Manual)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    /// 大小写不敏感，接受历史别名
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infrared_ultrasonic" | "line_follow" | "linefollow" => Ok(Mode::LineFollow),
            "manual" => Ok(Mode::Manual),
            "idle" => Ok(Mode::Idle),
            other => Err(ProtocolError::UnknownMode(other.to_string())),
        }
    }
}

impl Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// 控制状态
///
/// # 不变量
///
/// - 只有控制循环线程修改（单写者）
/// - `active == false` 时电机保持停止
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlState {
    /// 是否处于激活（驾驶）状态
    pub active: bool,
    /// 当前模式（未激活时保留，`Start` 时恢复）
    pub mode: Mode,
    /// 蜂鸣器状态
    pub buzzer_on: bool,
}

impl ControlState {
    /// 创建未激活的初始状态
    pub fn new(mode: Mode) -> Self {
        Self {
            active: false,
            mode,
            buzzer_on: false,
        }
    }

    /// 是否在指定模式下激活
    pub fn is_active_in(&self, mode: Mode) -> bool {
        self.active && self.mode == mode
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

/// 四轮电机占空比
///
/// 顺序为 FL（左前）, BL（左后）, FR（右前）, BR（右后）。
/// 构造时自动限幅到 [-4095, 4095]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "[i16; 4]", try_from = "[i32; 4]")]
pub struct MotorDuty {
    duties: [i16; 4],
}

impl MotorDuty {
    /// 全部停止
    pub const STOP: MotorDuty = MotorDuty { duties: [0; 4] };

    /// 创建占空比（自动限幅）
    pub fn new(fl: i32, bl: i32, fr: i32, br: i32) -> Self {
        Self {
            duties: [clamp(fl), clamp(bl), clamp(fr), clamp(br)],
        }
    }

    /// 四轮相同占空比
    pub fn uniform(duty: i32) -> Self {
        Self::new(duty, duty, duty, duty)
    }

    /// 按 FL, BL, FR, BR 顺序返回
    pub fn as_array(&self) -> [i16; 4] {
        self.duties
    }

    pub fn fl(&self) -> i16 {
        self.duties[0]
    }

    pub fn bl(&self) -> i16 {
        self.duties[1]
    }

    pub fn fr(&self) -> i16 {
        self.duties[2]
    }

    pub fn br(&self) -> i16 {
        self.duties[3]
    }

    /// 是否全部为 0
    pub fn is_stopped(&self) -> bool {
        self.duties == [0; 4]
    }

    /// 序列化为存储格式（`[fl,bl,fr,br]`）
    pub fn to_storage(&self) -> String {
        let [fl, bl, fr, br] = self.duties;
        format!("[{fl},{bl},{fr},{br}]")
    }

    /// 从存储格式解析
    ///
    /// 兼容 `[1, 2, 3, 4]` 与 `(1, 2, 3, 4)` 两种写法。
    pub fn from_storage(text: &str) -> Result<Self, ProtocolError> {
        let inner = text
            .trim()
            .trim_start_matches(['[', '('])
            .trim_end_matches([']', ')']);
        let values = inner
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ProtocolError::InvalidMotor(text.to_string()))?;
        match values.as_slice() {
            [fl, bl, fr, br] => Ok(Self::new(*fl, *bl, *fr, *br)),
            _ => Err(ProtocolError::InvalidMotor(text.to_string())),
        }
    }
}

impl From<MotorDuty> for [i16; 4] {
    fn from(duty: MotorDuty) -> Self {
        duty.duties
    }
}

impl TryFrom<[i32; 4]> for MotorDuty {
    type Error = ProtocolError;

    fn try_from(value: [i32; 4]) -> Result<Self, Self::Error> {
        if value.iter().any(|d| d.unsigned_abs() > MAX_DUTY as u32) {
            return Err(ProtocolError::InvalidMotor(format!("{value:?}")));
        }
        Ok(Self::new(value[0], value[1], value[2], value[3]))
    }
}

fn clamp(duty: i32) -> i16 {
    duty.clamp(-(MAX_DUTY as i32), MAX_DUTY as i32) as i16
}

/// 三路巡线传感器读数
///
/// bit2 = 左, bit1 = 中, bit0 = 右；1 表示检测到线。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub struct LineBits(u8);

impl LineBits {
    pub fn new(bits: u8) -> Result<Self, ProtocolError> {
        if bits > 0b111 {
            return Err(ProtocolError::InvalidLineBits(bits));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn left(self) -> bool {
        self.0 & 0b100 != 0
    }

    pub fn mid(self) -> bool {
        self.0 & 0b010 != 0
    }

    pub fn right(self) -> bool {
        self.0 & 0b001 != 0
    }
}

impl From<LineBits> for u8 {
    fn from(bits: LineBits) -> Self {
        bits.0
    }
}

impl TryFrom<u8> for LineBits {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for LineBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03b}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_aliases() {
        assert_eq!("infrared_ultrasonic".parse::<Mode>().unwrap(), Mode::LineFollow);
        assert_eq!("Line_Follow".parse::<Mode>().unwrap(), Mode::LineFollow);
        assert_eq!(" MANUAL ".parse::<Mode>().unwrap(), Mode::Manual);
        assert_eq!("idle".parse::<Mode>().unwrap(), Mode::Idle);
        assert!(matches!(
            "light".parse::<Mode>(),
            Err(ProtocolError::UnknownMode(m)) if m == "light"
        ));
    }

    #[test]
    fn test_mode_selectable() {
        assert!(Mode::LineFollow.is_selectable());
        assert!(Mode::Manual.is_selectable());
        assert!(!Mode::Idle.is_selectable());
    }

    #[test]
    fn test_control_state_initial() {
        let state = ControlState::new(Mode::Manual);
        assert!(!state.active);
        assert!(!state.buzzer_on);
        assert!(!state.is_active_in(Mode::Manual));
    }

    #[test]
    fn test_motor_duty_clamps() {
        let duty = MotorDuty::new(5000, -5000, 4095, -4095);
        assert_eq!(duty.as_array(), [4095, -4095, 4095, -4095]);
        assert_eq!(duty.fl(), 4095);
        assert_eq!(duty.bl(), -4095);
    }

    #[test]
    fn test_motor_duty_storage_format() {
        let duty = MotorDuty::new(-600, -600, 1000, 1000);
        assert_eq!(duty.to_storage(), "[-600,-600,1000,1000]");
        assert_eq!(MotorDuty::from_storage("(-600, -600, 1000, 1000)").unwrap(), duty);
        assert!(MotorDuty::from_storage("[1,2,3]").is_err());
        assert!(MotorDuty::from_storage("None").is_err());
    }

    #[test]
    fn test_motor_duty_json_is_array() {
        let json = serde_json::to_string(&MotorDuty::uniform(450)).unwrap();
        assert_eq!(json, "[450,450,450,450]");
        assert!(serde_json::from_str::<MotorDuty>("[9000,0,0,0]").is_err());
    }

    #[test]
    fn test_line_bits() {
        let bits = LineBits::new(0b110).unwrap();
        assert!(bits.left());
        assert!(bits.mid());
        assert!(!bits.right());
        assert_eq!(bits.to_string(), "110");
        assert!(matches!(LineBits::new(8), Err(ProtocolError::InvalidLineBits(8))));
    }
}
