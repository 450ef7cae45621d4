//! 遥测样本
//!
//! - [`TelemetryRecord`]: 控制循环产生的一次采样（尚未入库）
//! - [`TelemetrySample`]: 本地缓冲区中的一行（带 `LocalId` 与同步状态）
//! - [`TelemetryPayload`]: 出站 JSON 格式

use crate::control::{ControlState, LineBits, Mode, MotorDuty};
use crate::error::ProtocolError;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::fmt;

/// 本地缓冲区分配的行 ID（同一缓冲区内严格递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LocalId(pub i64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 同步状态（只允许 Unsynced → Synced）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Unsynced,
    Synced,
}

impl SyncState {
    pub fn from_flag(synced: bool) -> Self {
        if synced { SyncState::Synced } else { SyncState::Unsynced }
    }

    pub fn is_synced(self) -> bool {
        matches!(self, SyncState::Synced)
    }
}

/// 一次遥测采样
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// UTC，毫秒精度
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    /// 巡线读数，读取失败时为 `None`
    pub line_bits: Option<LineBits>,
    pub distance_cm: Option<f32>,
    pub battery_voltage: Option<f32>,
    /// 最近一次下发的电机占空比
    pub motor: MotorDuty,
}

impl TelemetryRecord {
    /// 以当前时间创建采样
    pub fn now(
        mode: Mode,
        line_bits: Option<LineBits>,
        distance_cm: Option<f32>,
        battery_voltage: Option<f32>,
        motor: MotorDuty,
    ) -> Self {
        Self::at(Utc::now(), mode, line_bits, distance_cm, battery_voltage, motor)
    }

    /// 以指定时间创建采样（时间戳截断到毫秒）
    pub fn at(
        timestamp: DateTime<Utc>,
        mode: Mode,
        line_bits: Option<LineBits>,
        distance_cm: Option<f32>,
        battery_voltage: Option<f32>,
        motor: MotorDuty,
    ) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(3),
            mode,
            line_bits,
            distance_cm,
            battery_voltage,
            motor,
        }
    }
}

/// 本地缓冲区中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub local_id: LocalId,
    pub record: TelemetryRecord,
    pub sync_state: SyncState,
}

/// 出站遥测 JSON
///
/// ```json
/// {"mode":"manual","simulate":true,"ir":5,"distance":42.0,"battery":7.4,
///  "motor":[800,800,800,800],"car_active":true,"ts":"2026-01-01T00:00:00.000Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPayload {
    pub mode: Mode,
    pub simulate: bool,
    pub ir: Option<u8>,
    pub distance: Option<f32>,
    pub battery: Option<f32>,
    pub motor: MotorDuty,
    pub car_active: bool,
    pub ts: String,
}

impl TelemetryPayload {
    /// 由采样与当前控制状态组装
    pub fn from_record(record: &TelemetryRecord, state: &ControlState, simulate: bool) -> Self {
        Self {
            mode: record.mode,
            simulate,
            ir: record.line_bits.map(LineBits::bits),
            distance: record.distance_cm,
            battery: record.battery_voltage,
            motor: record.motor,
            car_active: state.active,
            ts: crate::format_timestamp(&record.timestamp),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> TelemetryRecord {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().unwrap()
            + chrono::Duration::microseconds(123_456);
        TelemetryRecord::at(
            ts,
            Mode::Manual,
            Some(LineBits::new(5).unwrap()),
            Some(42.5),
            None,
            MotorDuty::uniform(800),
        )
    }

    #[test]
    fn test_record_truncates_to_millis() {
        let record = sample_record();
        assert_eq!(record.timestamp.timestamp_subsec_micros(), 123_000);
    }

    #[test]
    fn test_payload_json_shape() {
        let mut state = ControlState::new(Mode::Manual);
        state.active = true;
        let payload = TelemetryPayload::from_record(&sample_record(), &state, true);
        let value: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();

        assert_eq!(value["mode"], "manual");
        assert_eq!(value["simulate"], true);
        assert_eq!(value["ir"], 5);
        assert_eq!(value["distance"], 42.5);
        assert!(value["battery"].is_null());
        assert_eq!(value["motor"], serde_json::json!([800, 800, 800, 800]));
        assert_eq!(value["car_active"], true);
        assert_eq!(value["ts"], "2026-01-02T03:04:05.123Z");
    }

    #[test]
    fn test_line_follow_wire_name() {
        let state = ControlState::new(Mode::LineFollow);
        let mut record = sample_record();
        record.mode = Mode::LineFollow;
        record.line_bits = None;
        let payload = TelemetryPayload::from_record(&record, &state, false);
        let json = payload.to_json().unwrap();
        assert!(json.contains(r#""mode":"infrared_ultrasonic""#));
        assert!(json.contains(r#""ir":null"#));
        assert!(json.contains(r#""car_active":false"#));
    }

    #[test]
    fn test_sync_state_flag() {
        assert!(SyncState::from_flag(true).is_synced());
        assert!(!SyncState::from_flag(false).is_synced());
        assert!(LocalId(1) < LocalId(2));
    }
}
