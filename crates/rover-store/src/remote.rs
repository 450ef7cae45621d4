//! 远端存储
//!
//! [`RemoteStore`] 是同步线程唯一依赖的接口；生产实现为 PostgreSQL。

use crate::error::SyncError;
use postgres::Config;
use postgres::config::SslMode;
use rover_protocol::TelemetrySample;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info};

/// 远端存储接口
///
/// `push_batch` 必须是原子的：要么整批写入成功，要么什么都不写。
pub trait RemoteStore: Send + Sync {
    fn push_batch(&self, batch: &[TelemetrySample]) -> Result<(), SyncError>;
}

const REMOTE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS telemetry (
    id       SERIAL PRIMARY KEY,
    ts       TIMESTAMPTZ NOT NULL,
    mode     TEXT        NOT NULL,
    ir       INTEGER,
    distance REAL,
    battery  REAL,
    motor    JSONB       NOT NULL
)";

const INSERT_SQL: &str =
    "INSERT INTO telemetry (ts, mode, ir, distance, battery, motor) VALUES ($1, $2, $3, $4, $5, $6)";

/// PostgreSQL 远端存储
///
/// 每个同步周期建立一次连接，每批一个事务。TLS 使用 rustls + webpki 根证书，
/// 连接串未指定 `sslmode` 时要求 TLS。
pub struct PostgresStore {
    config: Config,
    tls: MakeRustlsConnect,
}

impl PostgresStore {
    /// # 参数
    ///
    /// - `url`: libpq 风格连接串或 `postgres://` URL
    /// - `connect_timeout`: 建立连接的超时
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, SyncError> {
        let mut config: Config = url.parse()?;
        config.connect_timeout(connect_timeout);
        // 默认的 prefer 在服务器不支持 TLS 时会退回明文；显式的 disable 保留
        if matches!(config.get_ssl_mode(), SslMode::Prefer) {
            config.ssl_mode(SslMode::Require);
        }

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        info!(
            "PostgreSQL remote store configured (hosts: {:?}, db: {:?})",
            config.get_hosts(),
            config.get_dbname()
        );
        Ok(Self {
            config,
            tls: MakeRustlsConnect::new(tls_config),
        })
    }
}

impl RemoteStore for PostgresStore {
    fn push_batch(&self, batch: &[TelemetrySample]) -> Result<(), SyncError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut client = self.config.connect(self.tls.clone())?;
        client.batch_execute(REMOTE_SCHEMA)?;

        let mut tx = client.transaction()?;
        let stmt = tx.prepare(INSERT_SQL)?;
        for sample in batch {
            let record = &sample.record;
            let ir = record.line_bits.map(|bits| i32::from(bits.bits()));
            let motor = serde_json::json!(record.motor.as_array());
            tx.execute(
                &stmt,
                &[
                    &record.timestamp,
                    &record.mode.as_str(),
                    &ir,
                    &record.distance_cm,
                    &record.battery_voltage,
                    &motor,
                ],
            )?;
        }
        tx.commit()?;

        debug!("Pushed {} telemetry samples to PostgreSQL", batch.len());
        Ok(())
    }
}
