//! 同步线程测试
//!
//! 验证至少一次同步语义：
//! 1. 接受方远端：一个周期后 M 行全部变为已同步
//! 2. 中途失败的远端：M 行全部保持未同步，下个周期重试
//! 3. 远端写入期间控制循环仍可插入
//! 4. 线程可以停止后重新启动

use parking_lot::Mutex;
use rover_protocol::{LineBits, LocalId, Mode, MotorDuty, TelemetryRecord, TelemetrySample};
use rover_store::{
    CycleOutcome, RemoteStore, SyncConfig, SyncError, SyncWorker, TelemetryBuffer, run_cycle,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// 内存远端：记录收到的行，可配置为在第 N 行失败
#[derive(Default)]
struct FakeRemote {
    rows: Mutex<Vec<LocalId>>,
    fail_after: Mutex<Option<usize>>,
    push_delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl FakeRemote {
    fn accepting() -> Self {
        Self::default()
    }

    fn failing_after(rows: usize) -> Self {
        let remote = Self::default();
        *remote.fail_after.lock() = Some(rows);
        remote
    }

    fn heal(&self) {
        *self.fail_after.lock() = None;
    }

    fn received(&self) -> Vec<LocalId> {
        self.rows.lock().clone()
    }
}

impl RemoteStore for FakeRemote {
    fn push_batch(&self, batch: &[TelemetrySample]) -> Result<(), SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.push_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        // 模拟事务：先写入暂存区，失败时整体丢弃
        let mut staged = Vec::new();
        for (index, sample) in batch.iter().enumerate() {
            if let Some(limit) = *self.fail_after.lock()
                && index >= limit
            {
                return Err(SyncError::Rejected(format!(
                    "connection reset after {} rows",
                    index
                )));
            }
            staged.push(sample.local_id);
        }
        self.rows.lock().extend(staged);
        Ok(())
    }
}

fn record(i: u8) -> TelemetryRecord {
    TelemetryRecord::now(
        Mode::LineFollow,
        LineBits::new(i % 8).ok(),
        Some(f32::from(i)),
        Some(7.4),
        MotorDuty::uniform(700),
    )
}

fn fill(buffer: &TelemetryBuffer, count: u8) -> Vec<LocalId> {
    (0..count).map(|i| buffer.insert(&record(i)).unwrap()).collect()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_accepting_remote_syncs_whole_batch() {
    let buffer = TelemetryBuffer::open_in_memory().unwrap();
    let ids = fill(&buffer, 25);
    let remote = FakeRemote::accepting();

    let outcome = run_cycle(&buffer, &remote, 200).unwrap();

    assert_eq!(outcome, CycleOutcome::Synced(ids.clone()));
    assert_eq!(buffer.count_unsynced().unwrap(), 0);
    assert_eq!(buffer.count_synced().unwrap(), 25);
    assert_eq!(remote.received(), ids);
}

#[test]
fn test_partial_failure_leaves_every_row_unsynced() {
    let buffer = TelemetryBuffer::open_in_memory().unwrap();
    let ids = fill(&buffer, 10);
    let remote = FakeRemote::failing_after(4);

    let err = run_cycle(&buffer, &remote, 200).unwrap_err();
    assert!(matches!(err, SyncError::Rejected(_)));
    assert_eq!(buffer.count_unsynced().unwrap(), 10);
    assert_eq!(buffer.count_synced().unwrap(), 0);
    assert!(remote.received().is_empty());

    // 下个周期原样重试同一批
    remote.heal();
    let outcome = run_cycle(&buffer, &remote, 200).unwrap();
    assert_eq!(outcome, CycleOutcome::Synced(ids));
    assert_eq!(buffer.count_unsynced().unwrap(), 0);
}

#[test]
fn test_worker_drains_buffer_in_background() {
    let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
    fill(&buffer, 30);
    let remote = Arc::new(FakeRemote::accepting());

    let mut worker = SyncWorker::new(
        buffer.clone(),
        remote.clone(),
        SyncConfig {
            interval: Duration::from_millis(20),
            batch_size: 7,
            stop_timeout: Duration::from_secs(2),
        },
    );
    worker.start().unwrap();
    assert!(worker.is_running());

    assert!(wait_until(Duration::from_secs(5), || {
        buffer.count_unsynced().unwrap() == 0
    }));
    worker.stop();
    assert!(!worker.is_running());

    assert_eq!(buffer.count_synced().unwrap(), 30);
    assert_eq!(remote.received().len(), 30);
    assert_eq!(worker.stats().synced_rows, 30);
}

#[test]
fn test_trigger_runs_cycle_without_waiting_for_interval() {
    let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
    let remote = Arc::new(FakeRemote::accepting());

    let mut worker = SyncWorker::new(
        buffer.clone(),
        remote.clone(),
        SyncConfig {
            interval: Duration::from_secs(3600),
            ..SyncConfig::default()
        },
    );
    worker.start().unwrap();
    // 第一个周期在启动时立即执行（缓冲区为空）
    assert!(wait_until(Duration::from_secs(2), || worker.stats().cycles >= 1));

    fill(&buffer, 3);
    worker.trigger();
    assert!(wait_until(Duration::from_secs(2), || {
        buffer.count_unsynced().unwrap() == 0
    }));
    worker.stop();
}

#[test]
fn test_failing_remote_retries_until_healed() {
    let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
    fill(&buffer, 5);
    let remote = Arc::new(FakeRemote::failing_after(0));

    let mut worker = SyncWorker::new(
        buffer.clone(),
        remote.clone(),
        SyncConfig {
            interval: Duration::from_millis(10),
            ..SyncConfig::default()
        },
    );
    worker.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || worker.stats().failed_cycles >= 3));
    assert_eq!(buffer.count_unsynced().unwrap(), 5);

    remote.heal();
    assert!(wait_until(Duration::from_secs(2), || {
        buffer.count_unsynced().unwrap() == 0
    }));
    worker.stop();
}

#[test]
fn test_inserts_continue_during_slow_remote_write() {
    let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
    fill(&buffer, 5);
    let remote = Arc::new(FakeRemote::accepting());
    *remote.push_delay.lock() = Duration::from_millis(300);

    let sync_buffer = buffer.clone();
    let sync_remote = remote.clone();
    let sync = thread::spawn(move || run_cycle(&sync_buffer, sync_remote.as_ref(), 200));

    assert!(wait_until(Duration::from_secs(1), || {
        remote.calls.load(Ordering::SeqCst) == 1
    }));
    let start = Instant::now();
    buffer.insert(&record(99)).unwrap();
    assert!(start.elapsed() < Duration::from_millis(200));

    match sync.join().unwrap().unwrap() {
        CycleOutcome::Synced(ids) => assert_eq!(ids.len(), 5),
        other => panic!("unexpected outcome: {:?}", other),
    }
    // 远端写入期间插入的行不在这一批里
    assert_eq!(buffer.count_unsynced().unwrap(), 1);
}

#[test]
fn test_worker_restart_after_stop() {
    let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
    let remote = Arc::new(FakeRemote::accepting());
    let mut worker = SyncWorker::new(
        buffer.clone(),
        remote,
        SyncConfig {
            interval: Duration::from_millis(10),
            ..SyncConfig::default()
        },
    );

    worker.start().unwrap();
    worker.stop();
    assert!(!worker.is_running());

    fill(&buffer, 4);
    worker.start().unwrap();
    assert!(worker.is_running());
    assert!(wait_until(Duration::from_secs(2), || {
        buffer.count_unsynced().unwrap() == 0
    }));
    worker.stop();
}

#[test]
fn test_stop_is_bounded_when_remote_hangs() {
    let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
    fill(&buffer, 1);
    let remote = Arc::new(FakeRemote::accepting());
    *remote.push_delay.lock() = Duration::from_secs(3);

    let mut worker = SyncWorker::new(
        buffer,
        remote.clone(),
        SyncConfig {
            interval: Duration::from_millis(10),
            batch_size: 200,
            stop_timeout: Duration::from_millis(200),
        },
    );
    worker.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || {
        remote.calls.load(Ordering::SeqCst) == 1
    }));

    let start = Instant::now();
    worker.stop();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!worker.is_running());
}

#[test]
fn test_independent_workers_do_not_share_state() {
    // 两个独立的同步线程互不影响
    let buffer = Arc::new(TelemetryBuffer::open_in_memory().unwrap());
    let mut a = SyncWorker::new(
        buffer.clone(),
        Arc::new(FakeRemote::accepting()),
        SyncConfig::default(),
    );
    let mut b = SyncWorker::new(buffer, Arc::new(FakeRemote::accepting()), SyncConfig::default());
    a.start().unwrap();
    b.start().unwrap();
    a.stop();
    assert!(!a.is_running());
    assert!(b.is_running());
    b.stop();
}
