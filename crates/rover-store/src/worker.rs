//! 后台同步线程
//!
//! 周期性地把未同步的遥测行推送到远端存储：
//!
//! 1. `fetch_unsynced(batch_size)`，为空则等待下个周期
//! 2. `RemoteStore::push_batch`（整批原子）
//! 3. 成功后 `mark_synced` 恰好这批 ID
//!
//! 任一步失败整批保持未同步，下个周期原样重试，没有重试上限。

use crate::buffer::TelemetryBuffer;
use crate::error::SyncError;
use crate::remote::RemoteStore;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use rover_protocol::LocalId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 同步线程句柄
///
/// 线程只持有 `exited` 的发送端且从不发送；线程返回或 panic 展开时发送端被释放，
/// 接收端随即断开。
struct WorkerThread {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

impl WorkerThread {
    fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_tx, exited) = bounded::<()>(1);
        let handle = std::thread::Builder::new().name(name.into()).spawn(move || {
            let _exit = exit_tx;
            body();
        })?;
        Ok(Self { handle, exited })
    }

    /// 最多等待 `timeout`；超时后放弃该线程（不 join）
    fn join_within(self, timeout: Duration) -> Result<(), &'static str> {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.handle.join().map_err(|_| "panicked")
            },
            Err(RecvTimeoutError::Timeout) => Err("did not exit in time"),
        }
    }
}

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 同步周期（默认 30s）
    pub interval: Duration,
    /// 每批最大行数（默认 200）
    pub batch_size: usize,
    /// `stop()` 等待线程退出的上限（默认 2s，超时后放弃）
    pub stop_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 200,
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// 单个同步周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 没有未同步的行
    Idle,
    /// 成功同步的行 ID
    Synced(Vec<LocalId>),
}

/// 执行一个同步周期
///
/// 缓冲区锁只在各自的 `fetch_unsynced` / `mark_synced` 调用内持有，
/// 远端写入期间控制循环可以继续插入。
pub fn run_cycle(
    buffer: &TelemetryBuffer,
    remote: &dyn RemoteStore,
    batch_size: usize,
) -> Result<CycleOutcome, SyncError> {
    let batch = buffer.fetch_unsynced(batch_size)?;
    if batch.is_empty() {
        return Ok(CycleOutcome::Idle);
    }

    remote.push_batch(&batch)?;

    let ids: Vec<LocalId> = batch.iter().map(|sample| sample.local_id).collect();
    buffer.mark_synced(&ids)?;
    Ok(CycleOutcome::Synced(ids))
}

/// 同步统计（原子计数器）
#[derive(Debug, Default)]
pub struct SyncStats {
    cycles: AtomicU64,
    synced_rows: AtomicU64,
    failed_cycles: AtomicU64,
}

/// [`SyncStats`] 的快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatsSnapshot {
    pub cycles: u64,
    pub synced_rows: u64,
    pub failed_cycles: u64,
}

impl SyncStats {
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            synced_rows: self.synced_rows.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
        }
    }
}

enum WorkerSignal {
    /// 立即执行一个周期
    Trigger,
    Stop,
}

/// 后台同步线程句柄
///
/// 可以反复 `start()` / `stop()`；Drop 时自动 `stop()`。
pub struct SyncWorker {
    buffer: Arc<TelemetryBuffer>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    is_running: Arc<AtomicBool>,
    stats: Arc<SyncStats>,
    signal_tx: Option<Sender<WorkerSignal>>,
    handle: Option<WorkerThread>,
}

impl SyncWorker {
    pub fn new(
        buffer: Arc<TelemetryBuffer>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            buffer,
            remote,
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SyncStats::default()),
            signal_tx: None,
            handle: None,
        }
    }

    /// 启动同步线程（已在运行时无操作）
    pub fn start(&mut self) -> Result<(), SyncError> {
        if self.is_running() {
            debug!("Sync worker already running");
            return Ok(());
        }
        // 回收上一次 stop 超时后遗留的句柄
        self.handle = None;

        let (signal_tx, signal_rx) = bounded(4);
        // 每次启动使用新的运行标志，被放弃的旧线程退出时不会影响新线程
        self.is_running = Arc::new(AtomicBool::new(true));

        let ctx = WorkerContext {
            buffer: self.buffer.clone(),
            remote: self.remote.clone(),
            config: self.config.clone(),
            is_running: self.is_running.clone(),
            stats: self.stats.clone(),
        };
        let handle = WorkerThread::spawn("rover-sync", move || sync_loop(ctx, signal_rx))
            .map_err(|e| {
                self.is_running.store(false, Ordering::Release);
                SyncError::Spawn(e)
            })?;

        self.signal_tx = Some(signal_tx);
        self.handle = Some(handle);
        info!(
            "Sync worker started (interval={:?}, batch_size={})",
            self.config.interval, self.config.batch_size
        );
        Ok(())
    }

    /// 请求停止并等待线程退出（最多 `stop_timeout`，超时后放弃该线程）
    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(tx) = self.signal_tx.take() {
            let _ = tx.try_send(WorkerSignal::Stop);
        }

        let timeout = self.config.stop_timeout;
        if let Some(handle) = self.handle.take() {
            match handle.join_within(timeout) {
                Ok(()) => info!("Sync worker stopped"),
                Err(reason) => error!("Sync thread {} (timeout {:?}), abandoned", reason, timeout),
            }
        }
    }

    /// 立即执行一个周期（不等待周期到期）
    pub fn trigger(&self) {
        let Some(tx) = &self.signal_tx else {
            warn!("Sync worker not running, trigger ignored");
            return;
        };
        match tx.try_send(WorkerSignal::Trigger) {
            Ok(()) | Err(TrySendError::Full(_)) => {},
            Err(TrySendError::Disconnected(_)) => warn!("Sync thread has exited"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

struct WorkerContext {
    buffer: Arc<TelemetryBuffer>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    is_running: Arc<AtomicBool>,
    stats: Arc<SyncStats>,
}

fn sync_loop(ctx: WorkerContext, signal_rx: Receiver<WorkerSignal>) {
    while ctx.is_running.load(Ordering::Acquire) {
        ctx.stats.cycles.fetch_add(1, Ordering::Relaxed);
        match run_cycle(&ctx.buffer, ctx.remote.as_ref(), ctx.config.batch_size) {
            Ok(CycleOutcome::Idle) => debug!("No unsynced telemetry"),
            Ok(CycleOutcome::Synced(ids)) => {
                ctx.stats.synced_rows.fetch_add(ids.len() as u64, Ordering::Relaxed);
                info!("Synced {} telemetry samples to remote store", ids.len());
            },
            Err(e) => {
                ctx.stats.failed_cycles.fetch_add(1, Ordering::Relaxed);
                error!("Sync cycle failed, batch left unsynced: {}", e);
            },
        }

        // 可中断的等待
        match signal_rx.recv_timeout(ctx.config.interval) {
            Ok(WorkerSignal::Trigger) | Err(RecvTimeoutError::Timeout) => {},
            Ok(WorkerSignal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    ctx.is_running.store(false, Ordering::Release);
    debug!("Sync loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_protocol::{MotorDuty, Mode, TelemetryRecord, TelemetrySample};
    use std::sync::atomic::AtomicUsize;

    struct CountingStore {
        batches: AtomicUsize,
    }

    impl RemoteStore for CountingStore {
        fn push_batch(&self, _batch: &[TelemetrySample]) -> Result<(), SyncError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record() -> TelemetryRecord {
        TelemetryRecord::now(Mode::Manual, None, None, None, MotorDuty::STOP)
    }

    #[test]
    fn test_worker_thread_join_within() {
        let quick = WorkerThread::spawn("quick", || {}).unwrap();
        assert_eq!(quick.join_within(Duration::from_secs(2)), Ok(()));

        let panicking = WorkerThread::spawn("panicking", || panic!("remote exploded")).unwrap();
        assert_eq!(panicking.join_within(Duration::from_secs(2)), Err("panicked"));

        let (release_tx, release_rx) = bounded::<()>(1);
        let stuck = WorkerThread::spawn("stuck", move || {
            let _ = release_rx.recv();
        })
        .unwrap();
        let start = std::time::Instant::now();
        assert_eq!(stuck.join_within(Duration::from_millis(50)), Err("did not exit in time"));
        assert!(start.elapsed() < Duration::from_secs(2));
        drop(release_tx);
    }

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.stop_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_run_cycle_idle_does_not_touch_remote() {
        let buffer = TelemetryBuffer::open_in_memory().unwrap();
        let store = CountingStore {
            batches: AtomicUsize::new(0),
        };
        assert_eq!(run_cycle(&buffer, &store, 10).unwrap(), CycleOutcome::Idle);
        assert_eq!(store.batches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_run_cycle_respects_batch_size() {
        let buffer = TelemetryBuffer::open_in_memory().unwrap();
        for _ in 0..5 {
            buffer.insert(&record()).unwrap();
        }
        let store = CountingStore {
            batches: AtomicUsize::new(0),
        };

        match run_cycle(&buffer, &store, 3).unwrap() {
            CycleOutcome::Synced(ids) => assert_eq!(ids.len(), 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(buffer.count_unsynced().unwrap(), 2);
    }

    #[test]
    fn test_trigger_without_start_is_ignored() {
        let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
        let store = Arc::new(CountingStore {
            batches: AtomicUsize::new(0),
        });
        let worker = SyncWorker::new(buffer, store, SyncConfig::default());
        worker.trigger();
        assert!(!worker.is_running());
    }
}
