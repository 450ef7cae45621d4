//! # 配置文件
//!
//! 单个 TOML 文件，分为 `[control]`、`[capture]`、`[link]`、`[storage]`、`[sync]`
//! 五个段。所有字段都有默认值，空文件即为合法配置。
//!
//! ```toml
//! [control]
//! tick_ms = 50
//! initial_mode = "infrared_ultrasonic"
//!
//! [link]
//! username = "alice"
//!
//! [sync]
//! remote_url = "postgres://rover@db.example.org/telemetry"
//! ```
//!
//! 密钥类字段可由环境变量覆盖：
//!
//! | 环境变量 | 字段 |
//! |---|---|
//! | `ROVER_MQTT_USERNAME` | `link.username` |
//! | `ROVER_MQTT_KEY` | `link.key` |
//! | `ROVER_REMOTE_URL` | `sync.remote_url` |

use crate::error::ConfigError;
use rover_control::{CaptureConfig, ControlConfig, FusionConfig, ObstacleConfig};
use rover_link::LinkConfig;
use rover_protocol::Mode;
use rover_store::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_MQTT_USERNAME: &str = "ROVER_MQTT_USERNAME";
pub const ENV_MQTT_KEY: &str = "ROVER_MQTT_KEY";
pub const ENV_REMOTE_URL: &str = "ROVER_REMOTE_URL";

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub control: ControlSection,
    pub capture: CaptureSection,
    pub link: LinkSection,
    pub storage: StorageSection,
    pub sync: SyncSection,
}

impl RoverConfig {
    /// 从文件加载（含环境变量覆盖与校验）
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// 解析 TOML 文本（不读取环境变量，不校验）
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 用 `lookup` 返回的值覆盖密钥类字段（空字符串视为未设置）
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(username) = get(ENV_MQTT_USERNAME) {
            self.link.username = Some(username);
        }
        if let Some(key) = get(ENV_MQTT_KEY) {
            self.link.key = Some(key);
        }
        if let Some(url) = get(ENV_REMOTE_URL) {
            self.sync.remote_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let control = &self.control;
        if control.tick_ms == 0 || control.idle_tick_ms == 0 {
            return Err(ConfigError::Invalid("control tick must be positive".to_string()));
        }
        if control.inbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "control.inbox_capacity must be positive".to_string(),
            ));
        }
        if control.obstacle_threshold_cm.is_nan() || control.obstacle_threshold_cm <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "control.obstacle_threshold_cm must be positive, got {}",
                control.obstacle_threshold_cm
            )));
        }
        if self.link.keep_alive_secs < 5 {
            return Err(ConfigError::Invalid(format!(
                "link.keep_alive_secs must be at least 5, got {}",
                self.link.keep_alive_secs
            )));
        }
        if self.link.port == 0 {
            return Err(ConfigError::Invalid("link.port must be non-zero".to_string()));
        }
        if self.sync.batch_size == 0 || self.sync.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.batch_size and sync.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[control]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub tick_ms: u64,
    pub idle_tick_ms: u64,
    pub telemetry_interval_secs: u64,
    pub initial_mode: Mode,
    pub obstacle_threshold_cm: f32,
    pub reverse_duty: i32,
    pub reverse_ms: u64,
    pub settle_ms: u64,
    pub inbox_capacity: usize,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            idle_tick_ms: 100,
            telemetry_interval_secs: 10,
            initial_mode: Mode::LineFollow,
            obstacle_threshold_cm: 20.0,
            reverse_duty: -500,
            reverse_ms: 800,
            settle_ms: 50,
            inbox_capacity: 64,
        }
    }
}

impl ControlSection {
    pub fn to_control_config(&self) -> ControlConfig {
        ControlConfig {
            tick: Duration::from_millis(self.tick_ms),
            idle_tick: Duration::from_millis(self.idle_tick_ms),
            telemetry_interval: Duration::from_secs(self.telemetry_interval_secs),
            initial_mode: self.initial_mode,
            fusion: FusionConfig {
                obstacle_threshold_cm: self.obstacle_threshold_cm,
                ..FusionConfig::default()
            },
            obstacle: ObstacleConfig {
                reverse_duty: self.reverse_duty,
                reverse_duration: Duration::from_millis(self.reverse_ms),
                settle: Duration::from_millis(self.settle_ms),
            },
            inbox_capacity: self.inbox_capacity,
            ..ControlConfig::default()
        }
    }
}

/// `[capture]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub directory: PathBuf,
    pub image_base_url: Option<String>,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("captures"),
            image_base_url: None,
        }
    }
}

impl CaptureSection {
    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            directory: self.directory.clone(),
            image_base_url: self.image_base_url.clone(),
        }
    }
}

/// `[link]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub key: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub reconnect_backoff_secs: u64,
    pub ready_timeout_secs: u64,
    pub command_feed: String,
    pub telemetry_feed: String,
    /// 空字符串表示不发布拍照通知
    pub image_feed: Option<String>,
}

impl Default for LinkSection {
    fn default() -> Self {
        let link = LinkConfig::default();
        Self {
            host: link.host,
            port: link.port,
            use_tls: link.use_tls,
            username: None,
            key: None,
            client_id: None,
            keep_alive_secs: link.keep_alive.as_secs(),
            reconnect_backoff_secs: link.reconnect_backoff.as_secs(),
            ready_timeout_secs: link.ready_timeout.as_secs(),
            command_feed: link.command_feed,
            telemetry_feed: link.telemetry_feed,
            image_feed: link.image_feed,
        }
    }
}

impl LinkSection {
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            host: self.host.clone(),
            port: self.port,
            use_tls: self.use_tls,
            username: self.username.clone(),
            key: self.key.clone(),
            client_id: self.client_id.clone(),
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            reconnect_backoff: Duration::from_secs(self.reconnect_backoff_secs),
            ready_timeout: Duration::from_secs(self.ready_timeout_secs),
            command_feed: self.command_feed.clone(),
            telemetry_feed: self.telemetry_feed.clone(),
            image_feed: self.image_feed.clone().filter(|feed| !feed.is_empty()),
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// 本地 SQLite 缓冲文件
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/telemetry.db"),
        }
    }
}

/// `[sync]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// PostgreSQL 连接串；未设置时不启动同步线程
    pub remote_url: Option<String>,
    pub interval_secs: u64,
    pub batch_size: usize,
    pub stop_timeout_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            remote_url: None,
            interval_secs: 30,
            batch_size: 200,
            stop_timeout_ms: 2000,
            connect_timeout_secs: 10,
        }
    }
}

impl SyncSection {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_secs(self.interval_secs),
            batch_size: self.batch_size,
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
