//! 本地遥测缓冲区（SQLite，WAL）
//!
//! 只追加的持久队列，每行带一个同步标志。控制循环写入，同步线程读取并标记。
//! 每个操作只在自身执行期间持有连接锁，绝不跨网络调用持有。

use crate::error::StoreError;
use parking_lot::Mutex;
use rover_protocol::{
    LineBits, LocalId, MotorDuty, SyncState, TelemetryRecord, TelemetrySample, format_timestamp,
    parse_timestamp,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS telemetry (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    ts       TEXT    NOT NULL,
    mode     TEXT    NOT NULL,
    ir       INTEGER,
    distance REAL,
    battery  REAL,
    motor    TEXT    NOT NULL,
    synced   INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_telemetry_synced ON telemetry(synced);
";

const SELECT_COLUMNS: &str = "SELECT id, ts, mode, ir, distance, battery, motor, synced FROM telemetry";

/// 持久遥测缓冲区
///
/// `AUTOINCREMENT` 保证 ID 在整个库文件生命周期内严格递增（删除行后也不复用）。
pub struct TelemetryBuffer {
    conn: Mutex<Connection>,
}

impl TelemetryBuffer {
    /// 打开（或创建）库文件，父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        info!(
            "Telemetry buffer opened at {} (journal_mode={})",
            path.display(),
            journal_mode
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 内存库（测试用，不持久）
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 追加一条采样，返回新分配的 `LocalId`（同步状态为 Unsynced）
    pub fn insert(&self, record: &TelemetryRecord) -> Result<LocalId, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO telemetry (ts, mode, ir, distance, battery, motor, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                format_timestamp(&record.timestamp),
                record.mode.as_str(),
                record.line_bits.map(LineBits::bits),
                record.distance_cm.map(f64::from),
                record.battery_voltage.map(f64::from),
                record.motor.to_storage(),
            ],
        )?;
        let id = LocalId(conn.last_insert_rowid());
        debug!("Telemetry sample {} buffered", id);
        Ok(id)
    }

    /// 按 ID 升序取最多 `limit` 条未同步行（不修改状态）
    pub fn fetch_unsynced(&self, limit: usize) -> Result<Vec<TelemetrySample>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE synced = 0 ORDER BY id ASC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], StoredRow::from_row)?;

        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?.into_sample()?);
        }
        Ok(samples)
    }

    /// 将给定 ID 标记为已同步
    ///
    /// 在一个事务内完成；已同步的 ID 再次标记是无操作。
    /// 任一 ID 不存在时整批回滚并返回 [`StoreError::UnknownLocalId`]。
    pub fn mark_synced(&self, ids: &[LocalId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("UPDATE telemetry SET synced = 1 WHERE id = ?1")?;
            for id in ids {
                if stmt.execute(params![id.0])? == 0 {
                    // tx 在 drop 时回滚
                    return Err(StoreError::UnknownLocalId(id.0));
                }
            }
        }
        tx.commit()?;
        debug!("Marked {} telemetry samples as synced", ids.len());
        Ok(())
    }

    /// 按 ID 读取一行
    pub fn get(&self, id: LocalId) -> Result<Option<TelemetrySample>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id.0],
                StoredRow::from_row,
            )
            .optional()?;
        row.map(StoredRow::into_sample).transpose()
    }

    pub fn count_unsynced(&self) -> Result<u64, StoreError> {
        self.count_where(false)
    }

    pub fn count_synced(&self) -> Result<u64, StoreError> {
        self.count_where(true)
    }

    fn count_where(&self, synced: bool) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM telemetry WHERE synced = ?1",
            params![synced],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

/// 库中一行的原始列值
struct StoredRow {
    id: i64,
    ts: String,
    mode: String,
    ir: Option<u8>,
    distance: Option<f64>,
    battery: Option<f64>,
    motor: String,
    synced: bool,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ts: row.get(1)?,
            mode: row.get(2)?,
            ir: row.get(3)?,
            distance: row.get(4)?,
            battery: row.get(5)?,
            motor: row.get(6)?,
            synced: row.get(7)?,
        })
    }

    fn into_sample(self) -> Result<TelemetrySample, StoreError> {
        let id = self.id;
        let corrupt = |source| StoreError::CorruptRow { id, source };

        let line_bits = self.ir.map(LineBits::new).transpose().map_err(corrupt)?;
        let record = TelemetryRecord::at(
            parse_timestamp(&self.ts).map_err(corrupt)?,
            self.mode.parse().map_err(corrupt)?,
            line_bits,
            self.distance.map(|d| d as f32),
            self.battery.map(|b| b as f32),
            MotorDuty::from_storage(&self.motor).map_err(corrupt)?,
        );
        Ok(TelemetrySample {
            local_id: LocalId(id),
            record,
            sync_state: SyncState::from_flag(self.synced),
        })
    }
}
