//! 入站指令解码
//!
//! 负载可以是结构化对象 `{"command": ..., "value": ..., "mode": ...}`，
//! 也可以是裸标量（`stop`、`"forward"`、`1`）。解码永不失败：
//! 无法识别的负载统一映射为 [`CommandMessage::Unknown`]。

use crate::control::Mode;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// 手动驾驶方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    /// 手动模式下停车（不退出激活状态）
    Stop,
}

/// LED 控制目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedTarget {
    All,
    Led1,
    Led2,
}

/// 解码后的入站指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandMessage {
    /// 急停：优先级最高
    Stop,
    /// 恢复激活，模式不变
    Start,
    /// 切换模式并激活
    ModeChange(Mode),
    /// 手动驾驶（隐式切换到 Manual 并激活）
    Manual(Direction),
    /// 蜂鸣器开关
    Buzzer(bool),
    LedControl { target: LedTarget, on: bool },
    /// 请求拍照
    Capture,
    /// 无法识别的指令（携带归一化后的原文，仅用于日志）
    Unknown(String),
}

impl CommandMessage {
    pub fn is_stop(&self) -> bool {
        matches!(self, CommandMessage::Stop)
    }
}

impl fmt::Display for CommandMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandMessage::Stop => f.write_str("stop"),
            CommandMessage::Start => f.write_str("start"),
            CommandMessage::ModeChange(mode) => write!(f, "mode({mode})"),
            CommandMessage::Manual(direction) => write!(f, "manual({direction:?})"),
            CommandMessage::Buzzer(on) => write!(f, "buzzer({on})"),
            CommandMessage::LedControl { target, on } => write!(f, "led({target:?}, {on})"),
            CommandMessage::Capture => f.write_str("capture"),
            CommandMessage::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}

/// 结构化负载（所有字段可选，类型宽松）
#[derive(Debug, Default, Deserialize)]
struct RawCommand {
    command: Option<Value>,
    value: Option<Value>,
    mode: Option<Value>,
    mode_value: Option<Value>,
}

/// 解码一条入站负载
///
/// # 规则
///
/// - 以 `{` 开头的负载按 JSON 对象解析，`command` 字段优先于 `value`，
///   `mode` 字段优先于 `mode_value`
/// - 其余负载按裸标量处理（带引号的 JSON 字符串会去掉引号）
/// - 指令名大小写不敏感，两端空白被忽略
pub fn decode_command(payload: &[u8]) -> CommandMessage {
    let Ok(text) = std::str::from_utf8(payload) else {
        warn!("Inbound payload is not valid UTF-8 ({} bytes)", payload.len());
        return CommandMessage::Unknown(String::from_utf8_lossy(payload).into_owned());
    };
    let text = text.trim();

    let (command, mode) = if text.starts_with('{') {
        match serde_json::from_str::<RawCommand>(text) {
            Ok(raw) => {
                let command = raw.command.or(raw.value).as_ref().and_then(scalar_text);
                let mode = raw.mode.or(raw.mode_value).as_ref().and_then(scalar_text);
                (command, mode)
            },
            Err(e) => {
                warn!("Malformed command object: {}", e);
                return CommandMessage::Unknown(text.to_string());
            },
        }
    } else {
        let scalar = match serde_json::from_str::<Value>(text) {
            Ok(Value::String(s)) => s,
            _ => text.to_string(),
        };
        (Some(scalar), None)
    };

    let command = command.map(|c| c.trim().to_ascii_lowercase()).unwrap_or_default();
    let decoded = classify(&command, mode.as_deref());
    debug!("Decoded command '{}' -> {}", command, decoded);
    decoded
}

fn classify(command: &str, mode: Option<&str>) -> CommandMessage {
    match command {
        "stop" => return CommandMessage::Stop,
        "start" => return CommandMessage::Start,
        _ => {},
    }

    if let Some(mode) = mode {
        return mode_change(mode);
    }
    if let Some(name) = command.strip_prefix("mode_") {
        return mode_change(name);
    }

    match command {
        "forward" => CommandMessage::Manual(Direction::Forward),
        "backward" => CommandMessage::Manual(Direction::Backward),
        "left" => CommandMessage::Manual(Direction::Left),
        "right" => CommandMessage::Manual(Direction::Right),
        "manual_stop" => CommandMessage::Manual(Direction::Stop),
        "buzzer_on" => CommandMessage::Buzzer(true),
        "buzzer_off" => CommandMessage::Buzzer(false),
        "led_on" => led(LedTarget::All, true),
        "led_off" => led(LedTarget::All, false),
        "led1_on" => led(LedTarget::Led1, true),
        "led1_off" => led(LedTarget::Led1, false),
        "led2_on" => led(LedTarget::Led2, true),
        "led2_off" => led(LedTarget::Led2, false),
        "take_photo" | "capture" => CommandMessage::Capture,
        other => {
            warn!("Unhandled command: '{}'", other);
            CommandMessage::Unknown(other.to_string())
        },
    }
}

fn mode_change(name: &str) -> CommandMessage {
    match name.parse::<Mode>() {
        Ok(mode) if mode.is_selectable() => CommandMessage::ModeChange(mode),
        Ok(mode) => {
            warn!("Mode '{}' cannot be selected remotely, ignored", mode);
            CommandMessage::Unknown(format!("mode_{}", mode.as_str()))
        },
        Err(e) => {
            warn!("{}, ignored", e);
            CommandMessage::Unknown(format!("mode_{}", name.trim().to_ascii_lowercase()))
        },
    }
}

fn led(target: LedTarget, on: bool) -> CommandMessage {
    CommandMessage::LedControl { target, on }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
