//! 拍照：单飞守卫 + 单个拍照工作线程
//!
//! - [`CaptureGuard`]: 全局最多一个拍照任务在执行（不区分触发来源）
//! - [`CaptureService`]: 守卫检查 + 容量为 1 的任务槽 + 专用工作线程
//!
//! 守卫锁只在检查 / 设置标志期间持有，不跨越拍照本身。

use crate::error::ControlError;
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use rover_hal::Camera;
use rover_protocol::{CaptureTask, CaptureTrigger, ImageNotice};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 单飞守卫
#[derive(Debug, Default)]
pub struct CaptureGuard {
    busy: Mutex<bool>,
}

impl CaptureGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 没有拍照在进行时占用守卫并返回 true；否则返回 false（调用方应静默丢弃请求）
    pub fn try_begin_capture(&self) -> bool {
        let mut busy = self.busy.lock();
        if *busy {
            return false;
        }
        *busy = true;
        true
    }

    /// 无条件释放
    pub fn end_capture(&self) {
        *self.busy.lock() = false;
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.lock()
    }
}

/// 拍照完成通知
pub trait ImageNotifier: Send + Sync {
    fn notify(&self, notice: &ImageNotice);
}

/// 拍照服务配置
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// 图片目录（默认 `captures`）
    pub directory: PathBuf,
    /// 图片访问基础 URL，配置后通知中带 `url`
    pub image_base_url: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("captures"),
            image_base_url: None,
        }
    }
}

/// 拍照服务
///
/// `request()` 与 `cancel_pending()` 只在控制循环线程调用；
/// 相机只在拍照工作线程使用。
pub struct CaptureService {
    guard: Arc<CaptureGuard>,
    slot_tx: Option<Sender<CaptureTask>>,
    slot_rx: Receiver<CaptureTask>,
    directory: PathBuf,
}

impl CaptureService {
    /// 启动拍照工作线程
    pub fn start(
        config: CaptureConfig,
        camera: Box<dyn Camera>,
        notifier: Option<Arc<dyn ImageNotifier>>,
    ) -> Result<Self, ControlError> {
        let guard = Arc::new(CaptureGuard::new());
        let (slot_tx, slot_rx) = bounded::<CaptureTask>(1);

        let worker = CaptureWorker {
            camera,
            guard: guard.clone(),
            slot: slot_rx.clone(),
            notifier,
            image_base_url: config.image_base_url,
        };
        std::thread::Builder::new()
            .name("rover-capture".into())
            .spawn(move || worker.run())
            .map_err(|source| ControlError::Spawn {
                name: "capture",
                source,
            })?;

        info!("Capture worker started (dir={})", config.directory.display());
        Ok(Self {
            guard,
            slot_tx: Some(slot_tx),
            slot_rx,
            directory: config.directory,
        })
    }

    /// 请求一次拍照
    ///
    /// # 返回
    ///
    /// 任务已交给工作线程时返回 true；已有拍照在进行时返回 false（请求被丢弃）
    pub fn request(&self, trigger: CaptureTrigger) -> bool {
        if !self.guard.try_begin_capture() {
            debug!("Capture already in progress, {} request dropped", trigger);
            return false;
        }

        let task = CaptureTask::new(&self.directory, trigger);
        let path = task.path.clone();
        let sent = self
            .slot_tx
            .as_ref()
            .map(|tx| tx.try_send(task).is_ok())
            .unwrap_or(false);
        if !sent {
            self.guard.end_capture();
            warn!("Capture worker unavailable, {} request dropped", trigger);
            return false;
        }
        info!("Capture requested ({}): {}", trigger, path.display());
        true
    }

    /// 取消尚未开始的拍照任务（正在进行的拍照不受影响）
    ///
    /// # 返回
    ///
    /// 确实取消了一个任务时返回 true
    pub fn cancel_pending(&self) -> bool {
        match self.slot_rx.try_recv() {
            Ok(task) => {
                self.guard.end_capture();
                info!("Pending capture cancelled: {}", task.path.display());
                true
            },
            Err(_) => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        // 关闭任务槽；进行中的拍照不会被强制取消
        self.slot_tx.take();
        debug!("Capture service closed");
    }
}

struct CaptureWorker {
    camera: Box<dyn Camera>,
    guard: Arc<CaptureGuard>,
    slot: Receiver<CaptureTask>,
    notifier: Option<Arc<dyn ImageNotifier>>,
    image_base_url: Option<String>,
}

impl CaptureWorker {
    fn run(mut self) {
        // 所有 Sender 关闭后退出（slot 的接收端副本不影响断开检测）
        while let Ok(task) = self.slot.recv() {
            // 相机实现 panic 时工作线程继续服务，守卫照常释放
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&task)));
            if outcome.is_err() {
                error!("Camera panicked while capturing {}", task.path.display());
            }
            self.guard.end_capture();
        }
        debug!("Capture worker exited");
    }

    fn execute(&mut self, task: &CaptureTask) {
        if let Err(e) = self.camera.capture_image(&task.path) {
            error!("Capture failed ({}): {}", task.path.display(), e);
            return;
        }
        info!("Image saved: {}", task.path.display());

        if let Some(notifier) = &self.notifier {
            let notice = ImageNotice::for_task(task, self.image_base_url.as_deref());
            notifier.notify(&notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_guard_single_flight() {
        let guard = CaptureGuard::new();
        assert!(guard.try_begin_capture());
        assert!(!guard.try_begin_capture());
        assert!(guard.is_busy());
        guard.end_capture();
        assert!(guard.try_begin_capture());
    }

    #[test]
    fn test_guard_end_is_unconditional() {
        let guard = CaptureGuard::new();
        guard.end_capture();
        assert!(!guard.is_busy());
    }

    #[test]
    fn test_guard_concurrent_callers_exactly_one_wins() {
        const CALLERS: usize = 16;
        let guard = Arc::new(CaptureGuard::new());
        let barrier = Arc::new(Barrier::new(CALLERS));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let guard = guard.clone();
                let barrier = barrier.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    barrier.wait();
                    if guard.try_begin_capture() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(guard.is_busy());
    }

    /// 第一次拍照时 panic，之后正常写文件
    struct FlakyCamera {
        calls: Arc<AtomicUsize>,
    }

    impl Camera for FlakyCamera {
        fn capture_image(&mut self, path: &Path) -> Result<(), rover_hal::HalError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("sensor driver crashed");
            }
            std::fs::write(path, b"jpeg")?;
            Ok(())
        }
    }

    fn wait_until_idle(service: &CaptureService) {
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while service.is_busy() {
            assert!(std::time::Instant::now() < deadline, "capture guard never released");
            thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn test_camera_panic_releases_guard_and_keeps_worker() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let config = CaptureConfig {
            directory: dir.path().to_path_buf(),
            image_base_url: None,
        };
        let camera = FlakyCamera {
            calls: calls.clone(),
        };
        let service = CaptureService::start(config, Box::new(camera), None).unwrap();

        assert!(service.request(CaptureTrigger::ManualRequest));
        wait_until_idle(&service);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(service.request(CaptureTrigger::ManualRequest));
        wait_until_idle(&service);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_capture_config_default() {
        let config = CaptureConfig::default();
        assert_eq!(config.directory, PathBuf::from("captures"));
        assert!(config.image_base_url.is_none());
    }
}
