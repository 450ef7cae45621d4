//! # Rover Store
//!
//! 遥测的持久化与同步：
//!
//! - [`TelemetryBuffer`]: 本地 SQLite 预写缓冲区（进程重启后不丢数据）
//! - [`RemoteStore`] / [`PostgresStore`]: 远端持久存储
//! - [`SyncWorker`]: 后台线程，按批把未同步行推送到远端（至少一次）
//!
//! ## 并发模型
//!
//! 缓冲区内部持有一把互斥锁，每个操作只在自身执行期间持有；
//! 同步线程在网络调用期间不持有该锁，控制循环的插入不会被远端故障阻塞。

mod buffer;
mod error;
mod remote;
mod worker;

pub use buffer::TelemetryBuffer;
pub use error::{StoreError, SyncError};
pub use remote::{PostgresStore, RemoteStore};
pub use worker::{CycleOutcome, SyncConfig, SyncStatsSnapshot, SyncWorker, run_cycle};
