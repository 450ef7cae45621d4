//! # Rover Protocol
//!
//! 车载控制器的数据模型与线上格式（无硬件依赖、无 IO）
//!
//! ## 模块
//!
//! - `control`: 控制状态（`ControlState`）、运行模式、电机占空比、巡线位
//! - `command`: 入站指令解码（MQTT 负载 → `CommandMessage`）
//! - `telemetry`: 遥测样本与出站 JSON 格式
//! - `capture`: 拍照任务描述
//!
//! ## 格式约定
//!
//! - 时间戳统一为 UTC，毫秒精度，ISO-8601（`2026-01-01T00:00:00.000Z`）
//! - 电机占空比顺序为 FL, BL, FR, BR，范围 [-4095, 4095]

pub mod capture;
pub mod command;
pub mod control;
mod error;
pub mod telemetry;

pub use capture::{CaptureTask, CaptureTrigger, ImageNotice};
pub use command::{CommandMessage, Direction, LedTarget, decode_command};
pub use control::{ControlState, LineBits, MAX_DUTY, Mode, MotorDuty};
pub use error::ProtocolError;
pub use telemetry::{LocalId, SyncState, TelemetryPayload, TelemetryRecord, TelemetrySample};

/// 将 UTC 时间格式化为线上使用的 ISO-8601 字符串（毫秒精度，`Z` 结尾）
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// 解析 ISO-8601 / RFC 3339 时间戳
pub fn parse_timestamp(text: &str) -> Result<chrono::DateTime<chrono::Utc>, ProtocolError> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&chrono::Utc))
        .map_err(|_| ProtocolError::InvalidTimestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp_millis_utc() {
        let ts = chrono::Utc
            .with_ymd_and_hms(2026, 3, 14, 15, 9, 26)
            .single()
            .unwrap()
            + chrono::Duration::milliseconds(535);
        assert_eq!(format_timestamp(&ts), "2026-03-14T15:09:26.535Z");
    }

    #[test]
    fn test_parse_timestamp_accepts_offset() {
        let ts = parse_timestamp("2026-03-14T16:09:26.535+01:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2026-03-14T15:09:26.535Z");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidTimestamp(_)));
    }
}
