//! 指令收件箱：传输线程 → 控制循环线程
//!
//! 回调侧（[`CommandInbox`]）只做 `try_send`，从不阻塞网络线程。
//! `Stop` 额外置位停止锁存并发送唤醒信号，使控制循环能在避障动作中途响应。

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use rover_link::CommandCallback;
use rover_protocol::CommandMessage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// 默认收件箱容量
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct InboxSignals {
    stop_latch: AtomicBool,
    /// 收件箱满时丢掉了一条 Stop
    stop_overflow: AtomicBool,
    received: AtomicU64,
    dropped: AtomicU64,
}

/// 收件箱统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxStats {
    pub received: u64,
    pub dropped: u64,
}

/// 创建收件箱（发送端交给传输层，接收端交给控制循环）
pub fn command_inbox(capacity: usize) -> (CommandInbox, InboxReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let (wake_tx, wake_rx) = bounded(1);
    let signals = Arc::new(InboxSignals::default());
    (
        CommandInbox {
            tx,
            wake_tx,
            signals: signals.clone(),
        },
        InboxReceiver {
            rx,
            wake_rx,
            signals,
        },
    )
}

/// 发送端（实现 [`CommandCallback`]）
pub struct CommandInbox {
    tx: Sender<CommandMessage>,
    wake_tx: Sender<()>,
    signals: Arc<InboxSignals>,
}

impl CommandInbox {
    /// 投递一条指令（非阻塞）
    ///
    /// Stop 先入队（或记录溢出）再置位锁存：控制循环只要观察到锁存，
    /// 对应的 Stop 一定已经可以被 `drain()` 或 `take_overflow_stop()` 取到。
    pub fn submit(&self, command: CommandMessage) {
        self.signals.received.fetch_add(1, Ordering::Relaxed);

        let is_stop = command.is_stop();
        if self.enqueue(command) && is_stop {
            self.raise_stop();
        }
    }

    /// # 返回
    ///
    /// 指令已入队，或因收件箱已满被丢弃（Stop 此时记为溢出）时返回 true；
    /// 控制循环已退出时返回 false
    fn enqueue(&self, command: CommandMessage) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                self.signals.dropped.fetch_add(1, Ordering::Relaxed);
                if command.is_stop() {
                    self.signals.stop_overflow.store(true, Ordering::Release);
                }
                warn!("Command inbox full, dropping {}", command);
                true
            },
            Err(TrySendError::Disconnected(command)) => {
                debug!("Control loop gone, dropping {}", command);
                false
            },
        }
    }

    fn raise_stop(&self) {
        self.signals.stop_latch.store(true, Ordering::Release);
        let _ = self.wake_tx.try_send(());
    }

    pub fn stats(&self) -> InboxStats {
        InboxStats {
            received: self.signals.received.load(Ordering::Relaxed),
            dropped: self.signals.dropped.load(Ordering::Relaxed),
        }
    }
}

impl CommandCallback for CommandInbox {
    fn on_command(&self, topic: &str, command: CommandMessage) {
        debug!("Command from {}: {}", topic, command);
        self.submit(command);
    }
}

/// 接收端（控制循环独占）
pub struct InboxReceiver {
    rx: Receiver<CommandMessage>,
    wake_rx: Receiver<()>,
    signals: Arc<InboxSignals>,
}

impl InboxReceiver {
    /// 每个 tick 开始时调用：清除锁存和残留的唤醒信号
    ///
    /// 必须在 [`drain`](Self::drain) 之前调用。被清除的锁存对应的 Stop 已在队列中，
    /// 会由随后的 `drain()` 取出；之后到达的 Stop 会重新置位锁存。
    pub fn begin_tick(&self) {
        self.signals.stop_latch.store(false, Ordering::Release);
        while self.wake_rx.try_recv().is_ok() {}
    }

    /// 按到达顺序取出当前所有指令
    pub fn drain(&self) -> Vec<CommandMessage> {
        self.rx.try_iter().collect()
    }

    /// 是否有 Stop 因收件箱已满而丢失（读取后清除）
    pub fn take_overflow_stop(&self) -> bool {
        self.signals.stop_overflow.swap(false, Ordering::AcqRel)
    }

    /// 本 tick 内是否收到 Stop
    pub fn stop_requested(&self) -> bool {
        self.signals.stop_latch.load(Ordering::Acquire)
    }

    /// 可被 Stop 打断的等待
    ///
    /// # 返回
    ///
    /// 等待期间（或之前）收到 Stop 时返回 true
    pub fn pause(&self, duration: Duration) -> bool {
        if self.stop_requested() {
            return true;
        }
        match self.wake_rx.recv_timeout(duration) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => self.stop_requested(),
            Err(RecvTimeoutError::Disconnected) => {
                // 发送端已释放，没有唤醒源
                thread::sleep(duration);
                self.stop_requested()
            },
        }
    }

    pub fn stats(&self) -> InboxStats {
        InboxStats {
            received: self.signals.received.load(Ordering::Relaxed),
            dropped: self.signals.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_protocol::{Direction, Mode};
    use std::time::Instant;

    #[test]
    fn test_drain_preserves_order() {
        let (inbox, receiver) = command_inbox(8);
        inbox.submit(CommandMessage::Start);
        inbox.submit(CommandMessage::Manual(Direction::Left));
        inbox.submit(CommandMessage::ModeChange(Mode::LineFollow));

        assert_eq!(
            receiver.drain(),
            vec![
                CommandMessage::Start,
                CommandMessage::Manual(Direction::Left),
                CommandMessage::ModeChange(Mode::LineFollow),
            ]
        );
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn test_stop_raises_latch_before_drain() {
        let (inbox, receiver) = command_inbox(8);
        receiver.begin_tick();
        assert!(!receiver.stop_requested());

        inbox.submit(CommandMessage::Stop);
        assert!(receiver.stop_requested());

        receiver.begin_tick();
        assert!(!receiver.stop_requested());
        // 指令本身仍在队列中
        assert_eq!(receiver.drain(), vec![CommandMessage::Stop]);
    }

    #[test]
    fn test_stop_queued_before_latch_reaches_this_tick() {
        let (inbox, receiver) = command_inbox(8);

        // 回调线程刚入队、尚未置位锁存时，控制循环开始新 tick
        assert!(inbox.enqueue(CommandMessage::Stop));
        receiver.begin_tick();
        assert_eq!(receiver.drain(), vec![CommandMessage::Stop]);

        // 锁存随后置位，本 tick 内的等待立即返回
        inbox.raise_stop();
        let start = Instant::now();
        assert!(receiver.pause(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_latched_stop_is_always_drainable() {
        let (inbox, receiver) = command_inbox(8);
        receiver.begin_tick();
        let drained = receiver.drain();
        assert!(drained.is_empty());

        // 进入避障动作后收到 Stop：锁存可见时指令已在队列里
        inbox.submit(CommandMessage::Stop);
        assert!(receiver.stop_requested());
        assert!(receiver.pause(Duration::from_secs(5)));

        receiver.begin_tick();
        assert_eq!(receiver.drain(), vec![CommandMessage::Stop]);
    }

    #[test]
    fn test_overflowed_stop_still_latches() {
        let (inbox, receiver) = command_inbox(1);
        inbox.submit(CommandMessage::Start);
        inbox.submit(CommandMessage::Stop);

        assert!(receiver.stop_requested());
        assert!(receiver.take_overflow_stop());
    }

    #[test]
    fn test_stop_after_loop_exit_is_ignored() {
        let (inbox, receiver) = command_inbox(8);
        let signals = receiver.signals.clone();
        drop(receiver);

        inbox.submit(CommandMessage::Stop);
        assert!(!signals.stop_latch.load(Ordering::Acquire));
    }

    #[test]
    fn test_manual_stop_does_not_latch() {
        let (inbox, receiver) = command_inbox(8);
        inbox.submit(CommandMessage::Manual(Direction::Stop));
        assert!(!receiver.stop_requested());
    }

    #[test]
    fn test_full_inbox_counts_drops_and_flags_stop() {
        let (inbox, receiver) = command_inbox(1);
        inbox.submit(CommandMessage::Start);
        inbox.submit(CommandMessage::Capture);
        inbox.submit(CommandMessage::Stop);

        assert_eq!(inbox.stats(), InboxStats { received: 3, dropped: 2 });
        assert!(receiver.take_overflow_stop());
        assert!(!receiver.take_overflow_stop());
        assert_eq!(receiver.drain(), vec![CommandMessage::Start]);
    }

    #[test]
    fn test_pause_interrupted_by_stop() {
        let (inbox, receiver) = command_inbox(8);
        receiver.begin_tick();

        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            inbox.submit(CommandMessage::Stop);
            inbox
        });

        let start = Instant::now();
        assert!(receiver.pause(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(2));
        let _inbox = sender.join().unwrap();
    }

    #[test]
    fn test_pause_times_out_without_stop() {
        let (_inbox, receiver) = command_inbox(8);
        let start = Instant::now();
        assert!(!receiver.pause(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_callback_forwards_to_inbox() {
        let (inbox, receiver) = command_inbox(8);
        let callback: Arc<dyn CommandCallback> = Arc::new(inbox);
        callback.on_command("alice/feeds/rover-commands", CommandMessage::Buzzer(true));
        assert_eq!(receiver.drain(), vec![CommandMessage::Buzzer(true)]);
        assert_eq!(receiver.stats().received, 1);
    }
}
