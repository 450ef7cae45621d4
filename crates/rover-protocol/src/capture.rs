//! 拍照任务

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// 拍照触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTrigger {
    /// 巡线模式下检测到障碍物
    ObstacleDetected,
    /// 远程指令
    ManualRequest,
}

impl CaptureTrigger {
    /// 文件名前缀
    pub fn prefix(self) -> &'static str {
        match self {
            CaptureTrigger::ObstacleDetected => "obstacle",
            CaptureTrigger::ManualRequest => "manual",
        }
    }
}

impl fmt::Display for CaptureTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// 一次拍照任务
///
/// 只在 CaptureGuard 占用期间存在；被拒绝的请求不会生成任务。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTask {
    pub path: PathBuf,
    pub requested_at: DateTime<Utc>,
    pub trigger: CaptureTrigger,
}

impl CaptureTask {
    /// 在 `dir` 下生成 `<trigger>_<YYYYmmdd_HHMMSS>.jpg`
    pub fn new(dir: &Path, trigger: CaptureTrigger) -> Self {
        Self::at(dir, trigger, Utc::now())
    }

    pub fn at(dir: &Path, trigger: CaptureTrigger, requested_at: DateTime<Utc>) -> Self {
        let file_name = format!(
            "{}_{}.jpg",
            trigger.prefix(),
            requested_at.format("%Y%m%d_%H%M%S")
        );
        Self {
            path: dir.join(file_name),
            requested_at: requested_at.trunc_subsecs(3),
            trigger,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

/// 拍照完成通知（发布到图片 topic）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageNotice {
    pub path: String,
    /// 仅在配置了图片基础 URL 时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub trigger: CaptureTrigger,
    pub ts: String,
}

impl ImageNotice {
    pub fn for_task(task: &CaptureTask, base_url: Option<&str>) -> Self {
        let url = match (base_url, task.file_name()) {
            (Some(base), Some(name)) => Some(format!("{}/{}", base.trim_end_matches('/'), name)),
            _ => None,
        };
        Self {
            path: task.path.display().to_string(),
            url,
            trigger: task.trigger,
            ts: crate::format_timestamp(&task.requested_at),
        }
    }

    pub fn to_json(&self) -> Result<String, crate::ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
