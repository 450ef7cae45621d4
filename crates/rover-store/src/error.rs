//! 存储层错误类型定义

use rover_protocol::ProtocolError;
use thiserror::Error;

/// 本地缓冲区错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 库中的行无法解码（模式名、占空比或时间戳损坏）
    #[error("Corrupt telemetry row {id}: {source}")]
    CorruptRow {
        id: i64,
        #[source]
        source: ProtocolError,
    },

    /// `mark_synced` 收到不存在的 ID（调用方缺陷，整批回滚）
    #[error("Unknown local id: {0}")]
    UnknownLocalId(i64),
}

/// 远端同步错误
///
/// 任何同步错误都意味着整批保持未同步，下个周期重试。
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local buffer error: {0}")]
    Local(#[from] StoreError),

    #[error("Remote store error: {0}")]
    Remote(#[from] postgres::Error),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// 远端拒绝整批（用于非 PostgreSQL 实现）
    #[error("Batch rejected by remote store: {0}")]
    Rejected(String),

    #[error("Failed to spawn sync thread: {0}")]
    Spawn(#[source] std::io::Error),
}
