//! SDK 错误类型

use rover_control::ControlError;
use rover_link::TransportError;
use rover_store::{StoreError, SyncError};
use std::path::PathBuf;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// 组装 / 启动错误
#[derive(Error, Debug)]
pub enum RoverError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Telemetry buffer error: {0}")]
    Store(#[from] StoreError),

    #[error("Sync worker error: {0}")]
    Sync(#[from] SyncError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
