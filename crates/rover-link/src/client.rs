//! 传输客户端
//!
//! 维持到远端指令 / 遥测通道的持久连接：
//!
//! - `connect()`: 启动监督线程，等待就绪（超时只告警，不失败）
//! - 监督线程：ConnAck → 订阅指令 topic → 就绪；连接错误 → 退避 → 重连（无上限）
//! - `publish()`: 入队即返回，QoS 1（允许重复）
//! - 入站消息解码为 `CommandMessage` 后交给 [`CommandCallback`]

use crate::backend::{LinkConnector, LinkEvent, LinkHandle, LinkSession};
use crate::callback::CommandCallback;
use crate::error::TransportError;
use crate::mqtt::MqttConnector;
use crate::state::{AtomicLinkState, LinkState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::{Mutex, RwLock};
use rover_protocol::{ImageNotice, TelemetryPayload, decode_command};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 链路配置
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Broker 主机名
    pub host: String,
    /// Broker 端口（默认 8883）
    pub port: u16,
    /// 是否启用 TLS（默认启用）
    pub use_tls: bool,
    pub username: Option<String>,
    /// 访问密钥（作为 MQTT 密码）
    pub key: Option<String>,
    /// 客户端 ID，缺省为 `rover-<unix 秒>`
    pub client_id: Option<String>,
    /// 心跳间隔（默认 60s）
    pub keep_alive: Duration,
    /// 连接错误后的重连退避（默认 5s）
    pub reconnect_backoff: Duration,
    /// `connect()` 等待就绪的上限（默认 10s）
    pub ready_timeout: Duration,
    pub command_feed: String,
    pub telemetry_feed: String,
    /// 拍照通知 feed（可选）
    pub image_feed: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "io.adafruit.com".to_string(),
            port: 8883,
            use_tls: true,
            username: None,
            key: None,
            client_id: None,
            keep_alive: Duration::from_secs(60),
            reconnect_backoff: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(10),
            command_feed: "rover-commands".to_string(),
            telemetry_feed: "rover-telemetry".to_string(),
            image_feed: Some("rover-images".to_string()),
        }
    }
}

impl LinkConfig {
    /// feed 名称对应的 topic
    ///
    /// 配置了用户名时为 `<username>/feeds/<feed>`，否则直接使用 feed 名称。
    pub fn topic(&self, feed: &str) -> String {
        match &self.username {
            Some(username) if !feed.contains('/') => format!("{username}/feeds/{feed}"),
            _ => feed.to_string(),
        }
    }

    pub fn command_topic(&self) -> String {
        self.topic(&self.command_feed)
    }

    pub fn telemetry_topic(&self) -> String {
        self.topic(&self.telemetry_feed)
    }

    pub fn image_topic(&self) -> Option<String> {
        self.image_feed.as_deref().map(|feed| self.topic(feed))
    }
}

/// 链路统计
#[derive(Debug, Default)]
struct LinkStats {
    published: AtomicU64,
    publish_failures: AtomicU64,
    received: AtomicU64,
    connection_errors: AtomicU64,
}

/// [`LinkStats`] 的快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatsSnapshot {
    pub published: u64,
    pub publish_failures: u64,
    pub received: u64,
    pub connection_errors: u64,
}

struct Supervisor {
    thread: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    shutdown_tx: Sender<()>,
    exited_rx: Receiver<()>,
}

/// 传输客户端
///
/// 所有方法都只需要 `&self`，可以放在 `Arc` 中被控制循环、拍照线程共享。
pub struct TransportClient {
    config: LinkConfig,
    connector: Box<dyn LinkConnector>,
    callback: Arc<dyn CommandCallback>,
    state: Arc<AtomicLinkState>,
    handle: RwLock<Option<Arc<dyn LinkHandle>>>,
    supervisor: Mutex<Option<Supervisor>>,
    stats: Arc<LinkStats>,
}

impl TransportClient {
    /// 使用 MQTT 后端创建客户端（尚未连接）
    pub fn new(config: LinkConfig, callback: Arc<dyn CommandCallback>) -> Self {
        let connector = Box::new(MqttConnector::new(config.clone()));
        Self::with_connector(config, connector, callback)
    }

    /// 使用自定义后端创建客户端
    pub fn with_connector(
        config: LinkConfig,
        connector: Box<dyn LinkConnector>,
        callback: Arc<dyn CommandCallback>,
    ) -> Self {
        Self {
            config,
            connector,
            callback,
            state: Arc::new(AtomicLinkState::new(LinkState::Disconnected)),
            handle: RwLock::new(None),
            supervisor: Mutex::new(None),
            stats: Arc::new(LinkStats::default()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// 启动监督线程并等待就绪
    ///
    /// Broker 不可达不会导致失败：超时后记录告警，重连在后台继续。
    /// 只有后端初始化或线程创建失败时返回错误。
    pub fn connect(&self) -> Result<(), TransportError> {
        let ready_rx = {
            let mut supervisor = self.supervisor.lock();
            if supervisor.is_some() {
                debug!("Transport supervisor already running");
                return Ok(());
            }

            let (handle, session) = self.connector.open()?;
            *self.handle.write() = Some(handle.clone());

            let (ready_tx, ready_rx) = bounded(1);
            let (shutdown_tx, shutdown_rx) = bounded(1);
            let (exited_tx, exited_rx) = bounded(1);
            let stop = Arc::new(AtomicBool::new(false));

            let ctx = SupervisorContext {
                handle,
                callback: self.callback.clone(),
                state: self.state.clone(),
                stats: self.stats.clone(),
                stop: stop.clone(),
                command_topic: self.config.command_topic(),
                backoff: self.config.reconnect_backoff,
                ready_tx,
                shutdown_rx,
            };
            self.state.swap(LinkState::Connecting);
            let thread = std::thread::Builder::new()
                .name("rover-link".into())
                .spawn(move || {
                    supervise(ctx, session);
                    let _ = exited_tx.send(());
                })
                .map_err(|e| {
                    self.state.swap(LinkState::Disconnected);
                    *self.handle.write() = None;
                    TransportError::Spawn(e)
                })?;

            *supervisor = Some(Supervisor {
                thread,
                stop,
                shutdown_tx,
                exited_rx,
            });
            ready_rx
        };

        match ready_rx.recv_timeout(self.config.ready_timeout) {
            Ok(()) => info!("Transport ready"),
            Err(_) => warn!(
                "Could not establish connection within {:?}, retrying in background",
                self.config.ready_timeout
            ),
        }
        Ok(())
    }

    /// 以至少一次语义发布（入队即返回）
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let handle = self.handle.read().clone();
        let Some(handle) = handle else {
            self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::NotConnected);
        };
        match handle.publish(topic, payload) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                trace!("Queued publish on {}", topic);
                Ok(())
            },
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            },
        }
    }

    /// 发布遥测到遥测 topic
    pub fn publish_telemetry(&self, payload: &TelemetryPayload) -> Result<(), TransportError> {
        let json = payload.to_json()?;
        self.publish(&self.config.telemetry_topic(), json.into_bytes())
    }

    /// 发布拍照通知（未配置图片 feed 时不发送）
    pub fn publish_image(&self, notice: &ImageNotice) -> Result<(), TransportError> {
        let Some(topic) = self.config.image_topic() else {
            return Ok(());
        };
        let json = notice.to_json()?;
        self.publish(&topic, json.into_bytes())
    }

    /// 停止监督线程并断开
    ///
    /// 最多等待 2s，超时后放弃监督线程。
    pub fn disconnect(&self) {
        let Some(supervisor) = self.supervisor.lock().take() else {
            return;
        };
        supervisor.stop.store(true, Ordering::Release);
        let _ = supervisor.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.write().take()
            && let Err(e) = handle.disconnect()
        {
            debug!("Disconnect request not queued: {}", e);
        }

        let timeout = Duration::from_secs(2);
        match supervisor.exited_rx.recv_timeout(timeout) {
            Ok(()) => {
                if supervisor.thread.join().is_err() {
                    error!("Transport supervisor panicked");
                }
                info!("Transport disconnected");
            },
            Err(_) => error!(
                "Transport supervisor failed to shut down within {:?}, abandoned",
                timeout
            ),
        }
        self.state.swap(LinkState::Disconnected);
    }

    pub fn state(&self) -> LinkState {
        self.state.get()
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            published: self.stats.published.load(Ordering::Relaxed),
            publish_failures: self.stats.publish_failures.load(Ordering::Relaxed),
            received: self.stats.received.load(Ordering::Relaxed),
            connection_errors: self.stats.connection_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct SupervisorContext {
    handle: Arc<dyn LinkHandle>,
    callback: Arc<dyn CommandCallback>,
    state: Arc<AtomicLinkState>,
    stats: Arc<LinkStats>,
    stop: Arc<AtomicBool>,
    command_topic: String,
    backoff: Duration,
    ready_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
}

/// 监督线程：驱动 Disconnected → Connecting → Connected 状态机
fn supervise(ctx: SupervisorContext, mut session: Box<dyn LinkSession>) {
    while !ctx.stop.load(Ordering::Acquire) {
        let Some(event) = session.next_event() else {
            debug!("Transport session closed");
            break;
        };

        match event {
            Ok(LinkEvent::Connected) => {
                if ctx.state.swap(LinkState::Connected) != LinkState::Connected {
                    info!("Transport connected");
                }
                // clean session：每次连接都重新订阅
                match ctx.handle.subscribe(&ctx.command_topic) {
                    Ok(()) => debug!("Subscribed to {}", ctx.command_topic),
                    Err(e) => warn!("Subscribe to {} failed: {}", ctx.command_topic, e),
                }
                let _ = ctx.ready_tx.try_send(());
            },
            Ok(LinkEvent::Message { topic, payload }) => {
                ctx.stats.received.fetch_add(1, Ordering::Relaxed);
                let command = decode_command(&payload);
                debug!("Command on {}: {}", topic, command);
                ctx.callback.on_command(&topic, command);
            },
            Ok(LinkEvent::Idle) => {},
            Err(e) => {
                if ctx.stop.load(Ordering::Acquire) {
                    break;
                }
                ctx.stats.connection_errors.fetch_add(1, Ordering::Relaxed);
                ctx.state.swap(LinkState::Disconnected);
                warn!("Transport error: {}; reconnecting in {:?}", e, ctx.backoff);

                // 可中断的退避
                match ctx.shutdown_rx.recv_timeout(ctx.backoff) {
                    Err(RecvTimeoutError::Timeout) => {},
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                ctx.state.swap(LinkState::Connecting);
            },
        }
    }
    ctx.state.swap(LinkState::Disconnected);
    debug!("Transport supervisor exited");
}
